use crate::cluster::ClusterClient;
use crate::discovery::PodDiscovery;
use crate::error::{ControllerError, Result};
use crate::patch::ImagePatcher;
use crate::strategy::{SequentialHaltOnFailure, StrategyOutcome, UpgradeStrategy};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use upgrader_core::{ObjectKey, UpgradePhase, UpgradeRequest, UpgradeType};

/// Configuration for the upgrade controller
#[derive(Debug, Clone)]
pub struct UpgradeControllerConfig {
    /// Interval between trigger loop passes
    pub poll_interval: Duration,
    /// Only watch requests in this namespace (all namespaces when None)
    pub namespace: Option<String>,
}

impl Default for UpgradeControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            namespace: None,
        }
    }
}

impl UpgradeControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ControllerError::invalid_config(
                "poll interval must be greater than zero",
                "Pass an interval such as --poll-interval 5",
            ));
        }
        Ok(())
    }
}

/// What the caller should do after a reconcile pass.
///
/// A pass that needs another attempt returns an error instead, classified
/// by `ControllerError::should_requeue`; `requeue` is reported to callers
/// such as the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileAction {
    pub requeue: bool,
}

impl ReconcileAction {
    pub fn done() -> Self {
        Self { requeue: false }
    }
}

/// Generation of each request the trigger loop is finished with
type HandledGenerations = HashMap<ObjectKey, i64>;

/// Drives UpGrade requests to completion against their Deployment's Pods
pub struct UpgradeController {
    client: Arc<dyn ClusterClient>,
    discovery: PodDiscovery,
    patcher: ImagePatcher,
    strategy: Box<dyn UpgradeStrategy>,
    config: UpgradeControllerConfig,
}

impl UpgradeController {
    pub fn new(client: Arc<dyn ClusterClient>, config: UpgradeControllerConfig) -> Self {
        Self {
            discovery: PodDiscovery::new(client.clone()),
            patcher: ImagePatcher::new(client.clone()),
            strategy: Box::new(SequentialHaltOnFailure),
            client,
            config,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn UpgradeStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Run the trigger loop until `token` is cancelled.
    ///
    /// Each pass lists requests and reconciles those whose generation has not
    /// been handled yet, plus those whose last pass asked to be requeued.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            interval = ?self.config.poll_interval,
            namespace = self.config.namespace.as_deref().unwrap_or("<all>"),
            strategy = self.strategy.name(),
            "Starting upgrade controller"
        );

        let mut handled = HandledGenerations::new();
        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Upgrade controller shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once(&mut handled).await {
                        error!(error = %e, "Upgrade controller poll failed");
                    }
                }
            }
        }
    }

    /// One trigger loop pass. Returns how many requests were reconciled.
    async fn poll_once(&self, handled: &mut HandledGenerations) -> Result<usize> {
        let requests = self
            .client
            .list_upgrade_requests(self.config.namespace.as_deref())
            .await?;
        debug!(count = requests.len(), "Listed upgrade requests");

        let live: HashSet<ObjectKey> = requests.iter().map(|r| r.key()).collect();
        handled.retain(|key, _| live.contains(key));

        let mut reconciled = 0;
        for request in requests {
            let key = request.key();
            let generation = request.metadata.generation.unwrap_or(0);
            if handled.get(&key) == Some(&generation) {
                continue;
            }

            reconciled += 1;
            match self.reconcile(&key).await {
                Ok(_) => {
                    handled.insert(key, generation);
                }
                Err(e) if e.should_requeue() => {
                    warn!(request = %key, error = %e, "Reconcile failed, will retry");
                    handled.remove(&key);
                }
                Err(e) => {
                    error!(
                        request = %key,
                        generation,
                        error = %e,
                        "Reconcile failed, waiting for the request to be edited"
                    );
                    handled.insert(key, generation);
                }
            }
        }

        Ok(reconciled)
    }

    /// Persist the request's status and adopt the stored object, so the next
    /// write carries the current resourceVersion
    async fn persist_status(&self, request: &mut UpgradeRequest) -> Result<()> {
        *request = self.client.update_upgrade_request_status(request).await?;
        Ok(())
    }

    /// Reconcile a single UpGrade request
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileAction> {
        let mut request = match self.client.get_upgrade_request(key).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                info!(request = %key, "Upgrade request no longer exists, skipping");
                return Ok(ReconcileAction::done());
            }
            Err(e) => return Err(e),
        };

        if request.phase() == Some(UpgradePhase::Successful) {
            debug!(request = %key, "Upgrade request already successful");
            return Ok(ReconcileAction::done());
        }

        if request.is_upgrade() {
            request.status_mut().type_ = Some(UpgradeType::Upgrade);
        }
        request.status_mut().transition(UpgradePhase::Running)?;
        self.persist_status(&mut request).await?;
        info!(request = %key, status = %UpgradePhase::Running, "Upgrade started");

        let target = request.spec.deployment_ref.clone();
        let pods = match self.discovery.find_pods(&target.name, &target.namespace).await {
            Ok(pods) => pods,
            Err(ControllerError::DeploymentNotFound { .. }) => {
                warn!(
                    request = %key,
                    deployment = %target.name,
                    namespace = %target.namespace,
                    "Target deployment not found, leaving request running"
                );
                return Ok(ReconcileAction::done());
            }
            Err(e) => return Err(e),
        };

        if pods.is_empty() {
            info!(
                request = %key,
                deployment = %target.name,
                namespace = %target.namespace,
                "Deployment owns no pods, leaving request running"
            );
            return Ok(ReconcileAction::done());
        }

        let requested = match request.spec.upgrade_replicas {
            0 => {
                self.discovery
                    .replica_count(&target.name, &target.namespace)
                    .await?
            }
            n => n,
        };
        let effective = usize::try_from(requested).unwrap_or(0).min(pods.len());
        let images = request.image_list();

        info!(
            request = %key,
            requested,
            effective,
            discovered = pods.len(),
            images = ?images,
            "Upgrading pods"
        );

        let outcome = self
            .strategy
            .execute(&self.patcher, &pods[..effective], &images)
            .await;
        debug!(
            request = %key,
            strategy = self.strategy.name(),
            upgraded = outcome.upgraded(),
            "Strategy finished"
        );

        match outcome {
            StrategyOutcome::Completed { upgraded } => {
                request.status_mut().transition(UpgradePhase::Successful)?;
                self.persist_status(&mut request).await?;

                request.status_mut().upgrade_replicas = i32::try_from(upgraded).unwrap_or(i32::MAX);
                self.persist_status(&mut request).await?;

                info!(
                    request = %key,
                    upgraded,
                    status = %UpgradePhase::Successful,
                    "Upgrade finished"
                );
                Ok(ReconcileAction::done())
            }
            StrategyOutcome::Halted {
                upgraded,
                failed_pod,
                error,
            } => {
                request.status_mut().transition(UpgradePhase::Failure)?;
                self.persist_status(&mut request).await?;

                error!(
                    request = %key,
                    pod = %failed_pod,
                    upgraded,
                    status = %UpgradePhase::Failure,
                    error = %error,
                    "Upgrade halted"
                );
                Err(error)
            }
        }
    }
}
