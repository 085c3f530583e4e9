use crate::error::ControllerError;
use crate::patch::ImagePatcher;
use async_trait::async_trait;
use tracing::{info, warn};
use upgrader_core::Pod;

/// Result of driving the patcher over a set of Pods
#[derive(Debug)]
pub enum StrategyOutcome {
    /// Every selected Pod was patched
    Completed { upgraded: usize },
    /// Stopped at `failed_pod`; the first `upgraded` Pods were patched
    Halted {
        upgraded: usize,
        failed_pod: String,
        error: ControllerError,
    },
}

impl StrategyOutcome {
    pub fn upgraded(&self) -> usize {
        match self {
            StrategyOutcome::Completed { upgraded } | StrategyOutcome::Halted { upgraded, .. } => {
                *upgraded
            }
        }
    }
}

/// Policy for rolling images out over the selected Pods
#[async_trait]
pub trait UpgradeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        patcher: &ImagePatcher,
        pods: &[Pod],
        images: &[String],
    ) -> StrategyOutcome;
}

/// One Pod at a time in the given order, stopping at the first rejected patch.
/// Pods already patched are left as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialHaltOnFailure;

#[async_trait]
impl UpgradeStrategy for SequentialHaltOnFailure {
    fn name(&self) -> &'static str {
        "sequential-halt-on-failure"
    }

    async fn execute(
        &self,
        patcher: &ImagePatcher,
        pods: &[Pod],
        images: &[String],
    ) -> StrategyOutcome {
        for (upgraded, pod) in pods.iter().enumerate() {
            if let Err(error) = patcher.upgrade_pod(pod, images).await {
                let failed_pod = pod.metadata.name.clone().unwrap_or_default();
                warn!(
                    pod = %failed_pod,
                    upgraded,
                    remaining = pods.len() - upgraded - 1,
                    "Halting upgrade"
                );
                return StrategyOutcome::Halted {
                    upgraded,
                    failed_pod,
                    error,
                };
            }
        }

        info!(upgraded = pods.len(), "All selected pods upgraded");
        StrategyOutcome::Completed {
            upgraded: pods.len(),
        }
    }
}
