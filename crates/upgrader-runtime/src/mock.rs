use crate::cluster::ClusterClient;
use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use json_patch::Patch;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use upgrader_core::resources::labels_match;
use upgrader_core::{
    Deployment, ObjectKey, Pod, ReplicaSet, Resource, UpgradeRequest, UpgradeSpec, UpgradeStatus,
};

/// A write observed by the mock cluster, in call order
#[derive(Debug, Clone)]
pub enum MockWrite {
    PodPatch {
        namespace: String,
        name: String,
        patch: Patch,
    },
    StatusUpdate {
        key: ObjectKey,
        status: Option<UpgradeStatus>,
    },
}

#[derive(Debug, Default)]
struct MockFailures {
    patch_pods: HashSet<String>,
    status_updates: bool,
    list_pods: bool,
    list_replica_sets: bool,
}

#[derive(Debug, Default)]
struct MockState {
    requests: BTreeMap<ObjectKey, UpgradeRequest>,
    deployments: BTreeMap<ObjectKey, Deployment>,
    // Vecs keep insertion order, which stands in for API list order
    replica_sets: Vec<ReplicaSet>,
    pods: Vec<Pod>,
    resource_version: u64,
    failures: MockFailures,
    writes: Vec<MockWrite>,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Fill in the server-managed metadata an API server would assign
    fn admit<R: Resource>(&mut self, resource: &mut R) {
        let version = self.next_version();
        let meta = resource.metadata_mut();
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(version);
    }
}

/// In-memory cluster for tests and local development
///
/// Holds UpGrade requests, Deployments, ReplicaSets and Pods, applies JSON
/// patches atomically, bumps `resourceVersion` on every write and rejects
/// stale status updates like an API server would. Failures can be injected
/// per call type, and every write is recorded for assertions.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding ---

    pub async fn add_upgrade_request(&self, mut request: UpgradeRequest) -> ObjectKey {
        let mut state = self.state.write().await;
        state.admit(&mut request);
        if request.metadata.generation.is_none() {
            request.metadata.generation = Some(1);
        }
        let key = request.key();
        state.requests.insert(key.clone(), request);
        key
    }

    /// Edit the spec of a stored request the way `kubectl edit` would,
    /// bumping its generation
    pub async fn edit_upgrade_spec<F>(&self, key: &ObjectKey, edit: F) -> Result<()>
    where
        F: FnOnce(&mut UpgradeSpec),
    {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let request = state
            .requests
            .get_mut(key)
            .ok_or_else(|| ControllerError::resource_not_found(key.to_string()))?;
        edit(&mut request.spec);
        request.metadata.generation = Some(request.metadata.generation.unwrap_or(0) + 1);
        request.metadata.resource_version = Some(version);
        Ok(())
    }

    pub async fn add_deployment(&self, mut deployment: Deployment) -> Result<()> {
        let key = deployment.object_key().map_err(|e| {
            ControllerError::internal_error(format!("Deployment has no key: {}", e))
        })?;
        let mut state = self.state.write().await;
        state.admit(&mut deployment);
        state.deployments.insert(key, deployment);
        Ok(())
    }

    pub async fn add_replica_set(&self, mut replica_set: ReplicaSet) {
        let mut state = self.state.write().await;
        state.admit(&mut replica_set);
        state.replica_sets.push(replica_set);
    }

    pub async fn add_pod(&self, mut pod: Pod) {
        let mut state = self.state.write().await;
        state.admit(&mut pod);
        state.pods.push(pod);
    }

    /// Seed the cluster from every `.yaml`/`.yml` file in `dir`.
    ///
    /// Files may hold several documents; each is routed by its `kind`.
    /// Returns the number of objects loaded.
    pub async fn load_manifests(&self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ControllerError::invalid_config(
                format!("cannot read manifest directory {}: {}", dir.display(), e),
                "Pass --mock with a directory of YAML manifests",
            )
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                ControllerError::invalid_config(
                    format!("cannot read {}: {}", path.display(), e),
                    "Check file permissions",
                )
            })?;
            for document in serde_yaml::Deserializer::from_str(&raw) {
                let value = serde_yaml::Value::deserialize(document).map_err(|e| {
                    ControllerError::invalid_config(
                        format!("invalid YAML in {}: {}", path.display(), e),
                        "Each document must be a Kubernetes object",
                    )
                })?;
                if value.is_null() {
                    continue;
                }
                self.load_object(value).await?;
                loaded += 1;
            }
        }

        info!("Loaded {} objects into mock cluster from {}", loaded, dir.display());
        Ok(loaded)
    }

    async fn load_object(&self, value: serde_yaml::Value) -> Result<()> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();

        let parse_err = |e: serde_yaml::Error| {
            ControllerError::invalid_config(
                format!("invalid {} manifest: {}", kind, e),
                "Check the manifest against the resource schema",
            )
        };

        match kind.as_str() {
            "UpGrade" => {
                let request: UpgradeRequest = serde_yaml::from_value(value).map_err(parse_err)?;
                request.validate().map_err(|e| {
                    ControllerError::invalid_config(
                        format!("invalid UpGrade manifest: {}", e),
                        "Set metadata and spec.deploymentRef",
                    )
                })?;
                self.add_upgrade_request(request).await;
            }
            "Deployment" => {
                self.add_deployment(serde_yaml::from_value(value).map_err(parse_err)?)
                    .await?
            }
            "ReplicaSet" => {
                self.add_replica_set(serde_yaml::from_value(value).map_err(parse_err)?)
                    .await
            }
            "Pod" => {
                let pod: Pod = serde_yaml::from_value(value).map_err(parse_err)?;
                pod.validate().map_err(|e| {
                    ControllerError::invalid_config(
                        format!("invalid Pod manifest: {}", e),
                        "Pods need metadata.name, metadata.namespace and at least one container",
                    )
                })?;
                self.add_pod(pod).await
            }
            other => {
                return Err(ControllerError::invalid_config(
                    format!("unsupported manifest kind '{}'", other),
                    "Supported kinds: UpGrade, Deployment, ReplicaSet, Pod",
                ))
            }
        }
        Ok(())
    }

    // --- Failure injection ---

    pub async fn fail_patch_for(&self, pod_name: &str) {
        self.state
            .write()
            .await
            .failures
            .patch_pods
            .insert(pod_name.to_string());
    }

    pub async fn fail_status_updates(&self, fail: bool) {
        self.state.write().await.failures.status_updates = fail;
    }

    pub async fn fail_pod_listing(&self, fail: bool) {
        self.state.write().await.failures.list_pods = fail;
    }

    pub async fn fail_replica_set_listing(&self, fail: bool) {
        self.state.write().await.failures.list_replica_sets = fail;
    }

    // --- Inspection ---

    pub async fn writes(&self) -> Vec<MockWrite> {
        self.state.read().await.writes.clone()
    }

    /// Names of patched Pods, in patch order
    pub async fn patched_pods(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .writes
            .iter()
            .filter_map(|w| match w {
                MockWrite::PodPatch { name, .. } => Some(name.clone()),
                MockWrite::StatusUpdate { .. } => None,
            })
            .collect()
    }

    pub async fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .read()
            .await
            .pods
            .iter()
            .find(|p| is_named(&p.metadata, namespace, name))
            .cloned()
    }

    /// Container images of a Pod, in container order
    pub async fn pod_images(&self, namespace: &str, name: &str) -> Vec<String> {
        self.pod(namespace, name)
            .await
            .and_then(|p| p.spec)
            .map(|s| {
                s.containers
                    .into_iter()
                    .map(|c| c.image.unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn upgrade_request(&self, key: &ObjectKey) -> Option<UpgradeRequest> {
        self.state.read().await.requests.get(key).cloned()
    }
}

fn is_named(meta: &upgrader_core::ObjectMeta, namespace: &str, name: &str) -> bool {
    meta.namespace.as_deref() == Some(namespace) && meta.name.as_deref() == Some(name)
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn get_upgrade_request(&self, key: &ObjectKey) -> Result<UpgradeRequest> {
        self.state
            .read()
            .await
            .requests
            .get(key)
            .cloned()
            .ok_or_else(|| ControllerError::resource_not_found(key.to_string()))
    }

    async fn list_upgrade_requests(&self, namespace: Option<&str>) -> Result<Vec<UpgradeRequest>> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|r| namespace.is_none_or(|ns| r.metadata.namespace.as_deref() == Some(ns)))
            .cloned()
            .collect())
    }

    async fn update_upgrade_request_status(
        &self,
        request: &UpgradeRequest,
    ) -> Result<UpgradeRequest> {
        let key = request.key();
        let mut state = self.state.write().await;

        if state.failures.status_updates {
            return Err(ControllerError::api_error(format!(
                "injected failure updating status of {}",
                key
            )));
        }

        let version = state.next_version();
        let stored = state
            .requests
            .get_mut(&key)
            .ok_or_else(|| ControllerError::resource_not_found(key.to_string()))?;

        if let Some(sent) = &request.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(sent) {
                return Err(ControllerError::conflict(key.to_string()));
            }
        }

        // Status subresource: only status changes, generation stays put
        stored.status = request.status.clone();
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();

        state.writes.push(MockWrite::StatusUpdate {
            key,
            status: updated.status.clone(),
        });
        debug!("Mock: status updated for {}", updated.key());
        Ok(updated)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.state
            .read()
            .await
            .deployments
            .get(&ObjectKey::new(namespace, name))
            .cloned()
            .ok_or_else(|| ControllerError::resource_not_found(format!("{}/{}", namespace, name)))
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ReplicaSet>> {
        let state = self.state.read().await;
        if state.failures.list_replica_sets {
            return Err(ControllerError::api_error("injected failure listing replicasets"));
        }
        Ok(state
            .replica_sets
            .iter()
            .filter(|rs| rs.metadata.namespace.as_deref() == Some(namespace))
            .filter(|rs| labels_match(selector, rs.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let state = self.state.read().await;
        if state.failures.list_pods {
            return Err(ControllerError::api_error("injected failure listing pods"));
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn patch_pod(&self, namespace: &str, name: &str, patch: &Patch) -> Result<Pod> {
        let mut state = self.state.write().await;

        if state.failures.patch_pods.contains(name) {
            return Err(ControllerError::api_error(format!(
                "injected failure patching pod {}/{}",
                namespace, name
            )));
        }

        let index = state
            .pods
            .iter()
            .position(|p| is_named(&p.metadata, namespace, name))
            .ok_or_else(|| ControllerError::resource_not_found(format!("{}/{}", namespace, name)))?;

        // Work on a copy so a failing operation leaves the stored Pod untouched
        let mut doc = serde_json::to_value(&state.pods[index])
            .map_err(|e| ControllerError::internal_error(format!("encode pod: {}", e)))?;
        json_patch::patch(&mut doc, &patch.0).map_err(|e| {
            ControllerError::api_error(format!(
                "the request is invalid: pod {}/{}: {}",
                namespace, name, e
            ))
        })?;
        let mut patched: Pod = serde_json::from_value(doc).map_err(|e| {
            ControllerError::api_error(format!("patched pod {}/{} is invalid: {}", namespace, name, e))
        })?;

        patched.metadata.resource_version = Some(state.next_version());
        state.pods[index] = patched.clone();
        state.writes.push(MockWrite::PodPatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            patch: patch.clone(),
        });
        debug!("Mock: pod patched: {}/{}", namespace, name);
        Ok(patched)
    }
}

/// Object builders shared by the crate's tests
#[cfg(test)]
pub(crate) mod fixtures {
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus, ReplicaSetSpec};
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
    use std::collections::BTreeMap;
    use upgrader_core::{
        Deployment, DeploymentRef, ImageRef, Pod, ReplicaSet, UpgradeRequest, UpgradeSpec,
        UpgradeType,
    };

    pub const NS: &str = "web";

    pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            ..Default::default()
        }
    }

    pub fn deployment(name: &str, observed_replicas: i32) -> Deployment {
        Deployment {
            metadata: meta(name),
            spec: Some(DeploymentSpec {
                replicas: Some(observed_replicas),
                selector: LabelSelector {
                    match_labels: Some(labels(&[("app", name)])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                replicas: Some(observed_replicas),
                ..Default::default()
            }),
        }
    }

    pub fn replica_set(name: &str, uid: &str, app: &str) -> ReplicaSet {
        let mut metadata = meta(name);
        metadata.uid = Some(uid.to_string());
        metadata.labels = Some(labels(&[("app", app), ("pod-template-hash", uid)]));
        ReplicaSet {
            metadata,
            spec: Some(ReplicaSetSpec {
                selector: LabelSelector {
                    match_labels: Some(labels(&[("app", app)])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    pub fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: format!("rs-{}", uid),
            uid: uid.to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    pub fn pod(name: &str, owners: Vec<OwnerReference>, images: &[&str]) -> Pod {
        let mut metadata = meta(name);
        metadata.owner_references = Some(owners);
        Pod {
            metadata,
            spec: Some(PodSpec {
                containers: images
                    .iter()
                    .enumerate()
                    .map(|(i, image)| Container {
                        name: format!("c{}", i),
                        image: Some(image.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            status: None,
        }
    }

    pub fn upgrade_request(deployment: &str, replicas: i32, images: &[&str]) -> UpgradeRequest {
        UpgradeRequest::new(
            "default",
            format!("roll-{}", deployment),
            UpgradeSpec {
                type_: UpgradeType::Upgrade,
                deployment_ref: DeploymentRef {
                    name: deployment.to_string(),
                    namespace: NS.to_string(),
                },
                upgrade_replicas: replicas,
                images: images.iter().map(|i| ImageRef::new(*i)).collect(),
            },
        )
    }
}
