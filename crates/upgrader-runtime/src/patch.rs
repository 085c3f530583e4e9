use crate::cluster::ClusterClient;
use crate::error::{ControllerError, Result};
use json_patch::Patch;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use upgrader_core::Pod;

/// Build the JSON-Patch that sets container `i` to `images[i]`.
///
/// Indices are not checked against the Pod; a patch naming a container the
/// Pod does not have is rejected as a whole by the API server.
pub fn build_image_patch(images: &[String]) -> Result<Patch> {
    let ops: Vec<serde_json::Value> = images
        .iter()
        .enumerate()
        .map(|(index, image)| {
            json!({
                "op": "replace",
                "path": format!("/spec/containers/{}/image", index),
                "value": image
            })
        })
        .collect();

    serde_json::from_value(serde_json::Value::Array(ops))
        .map_err(|e| ControllerError::internal_error(format!("Failed to build image patch: {}", e)))
}

/// Rewrites container images of a single Pod with one atomic patch
pub struct ImagePatcher {
    client: Arc<dyn ClusterClient>,
}

impl ImagePatcher {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Patch `pod` so container N runs `images[N]`
    pub async fn upgrade_pod(&self, pod: &Pod, images: &[String]) -> Result<()> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::internal_error("Pod has no name"))?;
        let namespace = pod
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| ControllerError::pod_upgrade_failed(name, "Pod has no namespace"))?;

        info!(pod = %name, namespace = %namespace, images = ?images, "Upgrading pod");

        let patch = build_image_patch(images)
            .map_err(|e| ControllerError::pod_upgrade_failed(name, e.to_string()))?;

        if let Err(e) = self.client.patch_pod(namespace, name, &patch).await {
            error!(pod = %name, namespace = %namespace, error = %e, "Patch pod failed");
            return Err(ControllerError::pod_upgrade_failed(name, e.to_string()));
        }

        info!(pod = %name, namespace = %namespace, "Pod upgraded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::fixtures::*;
    use crate::mock::MockCluster;

    fn images(refs: &[&str]) -> Vec<String> {
        refs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_image_patch_document() {
        let patch = build_image_patch(&images(&["nginx:1.27", "busybox:1.36"])).unwrap();
        let doc = serde_json::to_value(&patch).unwrap();

        assert_eq!(
            doc,
            json!([
                {"op": "replace", "path": "/spec/containers/0/image", "value": "nginx:1.27"},
                {"op": "replace", "path": "/spec/containers/1/image", "value": "busybox:1.36"}
            ])
        );
    }

    #[test]
    fn test_build_image_patch_empty() {
        let patch = build_image_patch(&[]).unwrap();
        assert!(patch.0.is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_pod_rewrites_images() {
        let cluster = MockCluster::new();
        let original = pod("nginx-0", vec![owner("rs-a")], &["nginx:1.25", "sidecar:1"]);
        cluster.add_pod(original.clone()).await;
        let patcher = ImagePatcher::new(Arc::new(cluster.clone()));

        patcher
            .upgrade_pod(&original, &images(&["nginx:1.27", "sidecar:2"]))
            .await
            .unwrap();

        assert_eq!(cluster.pod_images(NS, "nginx-0").await, vec!["nginx:1.27", "sidecar:2"]);
    }

    #[tokio::test]
    async fn test_upgrade_pod_is_idempotent() {
        let cluster = MockCluster::new();
        let original = pod("nginx-0", vec![owner("rs-a")], &["nginx:1.25"]);
        cluster.add_pod(original.clone()).await;
        let patcher = ImagePatcher::new(Arc::new(cluster.clone()));
        let target = images(&["nginx:1.27"]);

        patcher.upgrade_pod(&original, &target).await.unwrap();
        patcher.upgrade_pod(&original, &target).await.unwrap();

        assert_eq!(cluster.pod_images(NS, "nginx-0").await, vec!["nginx:1.27"]);
        assert_eq!(cluster.patched_pods().await.len(), 2);
    }

    #[tokio::test]
    async fn test_pod_without_namespace_is_not_patched() {
        let cluster = MockCluster::new();
        cluster.add_pod(pod("nginx-0", vec![owner("rs-a")], &["nginx:1.25"])).await;
        let mut stray = pod("nginx-0", vec![owner("rs-a")], &["nginx:1.25"]);
        stray.metadata.namespace = None;
        let patcher = ImagePatcher::new(Arc::new(cluster.clone()));

        let err = patcher
            .upgrade_pod(&stray, &images(&["nginx:1.27"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::PodUpgradeFailed { .. }));
        assert!(cluster.writes().await.is_empty());
        assert_eq!(cluster.pod_images(NS, "nginx-0").await, vec!["nginx:1.25"]);
    }

    #[tokio::test]
    async fn test_too_many_images_fails_without_changes() {
        let cluster = MockCluster::new();
        let original = pod("nginx-0", vec![owner("rs-a")], &["nginx:1.25"]);
        cluster.add_pod(original.clone()).await;
        let patcher = ImagePatcher::new(Arc::new(cluster.clone()));

        let err = patcher
            .upgrade_pod(&original, &images(&["nginx:1.27", "busybox:1.36"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::PodUpgradeFailed { .. }));
        assert!(!err.should_requeue());
        assert_eq!(cluster.pod_images(NS, "nginx-0").await, vec!["nginx:1.25"]);
    }
}
