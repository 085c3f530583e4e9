use crate::cluster::ClusterClient;
use crate::error::{ControllerError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use upgrader_core::resources::single_owner_uid;
use upgrader_core::{Deployment, Pod};

/// Resolves the live Pods of a Deployment through its ReplicaSets
pub struct PodDiscovery {
    client: Arc<dyn ClusterClient>,
}

impl PodDiscovery {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    async fn deployment(&self, name: &str, namespace: &str) -> Result<Deployment> {
        match self.client.get_deployment(namespace, name).await {
            Ok(d) => Ok(d),
            Err(ControllerError::ResourceNotFound { .. }) => {
                Err(ControllerError::deployment_not_found(namespace, name))
            }
            Err(e) => Err(e),
        }
    }

    /// Pods owned by the Deployment's ReplicaSets.
    ///
    /// Ordered by ReplicaSet list order, then Pod list order within each
    /// ReplicaSet. A Pod counts only if it has exactly one owner reference.
    /// An empty result means the Deployment exists but owns no Pods.
    pub async fn find_pods(&self, name: &str, namespace: &str) -> Result<Vec<Pod>> {
        let deployment = self.deployment(name, namespace).await?;

        let selector = deployment
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default();
        if selector.is_empty() {
            warn!(
                deployment = %name,
                namespace = %namespace,
                "Deployment has no matchLabels, no ReplicaSets can be resolved"
            );
            return Ok(Vec::new());
        }

        let replica_sets = self.client.list_replica_sets(namespace, &selector).await?;
        debug!(
            deployment = %name,
            count = replica_sets.len(),
            "Resolved ReplicaSets"
        );
        if replica_sets.is_empty() {
            return Ok(Vec::new());
        }

        // One LIST for the namespace, partitioned by owning ReplicaSet
        let mut by_owner: HashMap<String, Vec<Pod>> = HashMap::new();
        for pod in self.client.list_pods(namespace).await? {
            if let Some(uid) = single_owner_uid(&pod.metadata) {
                by_owner.entry(uid.to_string()).or_default().push(pod);
            }
        }

        let mut pods = Vec::new();
        for rs in &replica_sets {
            let Some(uid) = rs.metadata.uid.as_deref() else {
                continue;
            };
            if let Some(owned) = by_owner.remove(uid) {
                pods.extend(owned);
            }
        }

        info!(
            deployment = %name,
            namespace = %namespace,
            replica_sets = replica_sets.len(),
            pods = pods.len(),
            "Discovered pods"
        );
        Ok(pods)
    }

    /// Observed replica count (`status.replicas`) of the Deployment, 0 when unset
    pub async fn replica_count(&self, name: &str, namespace: &str) -> Result<i32> {
        let deployment = self.deployment(name, namespace).await?;
        Ok(deployment
            .status
            .and_then(|s| s.replicas)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::fixtures::*;
    use crate::mock::MockCluster;

    async fn setup() -> (MockCluster, PodDiscovery) {
        let cluster = MockCluster::new();
        let discovery = PodDiscovery::new(Arc::new(cluster.clone()));
        (cluster, discovery)
    }

    fn names(pods: &[Pod]) -> Vec<String> {
        pods.iter()
            .map(|p| p.metadata.name.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_find_pods_follows_replica_set_order() {
        let (cluster, discovery) = setup().await;
        cluster.add_deployment(deployment("nginx", 3)).await.unwrap();
        cluster.add_replica_set(replica_set("nginx-old", "rs-old", "nginx")).await;
        cluster.add_replica_set(replica_set("nginx-new", "rs-new", "nginx")).await;

        // Interleave Pods so list order differs from ReplicaSet order
        cluster.add_pod(pod("nginx-new-1", vec![owner("rs-new")], &["nginx:1.25"])).await;
        cluster.add_pod(pod("nginx-old-1", vec![owner("rs-old")], &["nginx:1.24"])).await;
        cluster.add_pod(pod("nginx-new-2", vec![owner("rs-new")], &["nginx:1.25"])).await;

        let pods = discovery.find_pods("nginx", NS).await.unwrap();
        assert_eq!(names(&pods), vec!["nginx-old-1", "nginx-new-1", "nginx-new-2"]);
    }

    #[tokio::test]
    async fn test_find_pods_excludes_foreign_and_multi_owner_pods() {
        let (cluster, discovery) = setup().await;
        cluster.add_deployment(deployment("nginx", 1)).await.unwrap();
        cluster.add_replica_set(replica_set("nginx-a", "rs-a", "nginx")).await;
        cluster.add_replica_set(replica_set("redis-a", "rs-redis", "redis")).await;

        cluster.add_pod(pod("nginx-a-1", vec![owner("rs-a")], &["nginx:1.25"])).await;
        cluster.add_pod(pod("redis-a-1", vec![owner("rs-redis")], &["redis:7"])).await;
        cluster.add_pod(pod("orphan", vec![], &["nginx:1.25"])).await;
        cluster
            .add_pod(pod("shared", vec![owner("rs-a"), owner("rs-redis")], &["nginx:1.25"]))
            .await;

        let pods = discovery.find_pods("nginx", NS).await.unwrap();
        assert_eq!(names(&pods), vec!["nginx-a-1"]);
    }

    #[tokio::test]
    async fn test_find_pods_is_deterministic() {
        let (cluster, discovery) = setup().await;
        cluster.add_deployment(deployment("nginx", 4)).await.unwrap();
        cluster.add_replica_set(replica_set("nginx-a", "rs-a", "nginx")).await;
        for i in 0..4 {
            cluster
                .add_pod(pod(&format!("nginx-a-{}", i), vec![owner("rs-a")], &["nginx:1.25"]))
                .await;
        }

        let first = discovery.find_pods("nginx", NS).await.unwrap();
        let second = discovery.find_pods("nginx", NS).await.unwrap();
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn test_missing_deployment_is_distinct_from_no_pods() {
        let (cluster, discovery) = setup().await;

        let err = discovery.find_pods("nginx", NS).await.unwrap_err();
        assert!(matches!(err, ControllerError::DeploymentNotFound { .. }));

        cluster.add_deployment(deployment("nginx", 0)).await.unwrap();
        assert!(discovery.find_pods("nginx", NS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_is_reported() {
        let (cluster, discovery) = setup().await;
        cluster.add_deployment(deployment("nginx", 1)).await.unwrap();
        cluster.add_replica_set(replica_set("nginx-a", "rs-a", "nginx")).await;
        cluster.fail_pod_listing(true).await;

        let err = discovery.find_pods("nginx", NS).await.unwrap_err();
        assert!(matches!(err, ControllerError::ApiError { .. }));
    }

    #[tokio::test]
    async fn test_replica_set_list_failure_is_not_empty_result() {
        let (cluster, discovery) = setup().await;
        cluster.add_deployment(deployment("nginx", 1)).await.unwrap();
        cluster.fail_replica_set_listing(true).await;

        let err = discovery.find_pods("nginx", NS).await.unwrap_err();
        assert!(err.should_requeue());
    }

    #[tokio::test]
    async fn test_deployment_without_match_labels_owns_nothing() {
        let (cluster, discovery) = setup().await;
        let mut d = deployment("nginx", 1);
        d.spec.as_mut().unwrap().selector.match_labels = None;
        cluster.add_deployment(d).await.unwrap();
        cluster.add_replica_set(replica_set("nginx-a", "rs-a", "nginx")).await;
        cluster.add_pod(pod("nginx-a-1", vec![owner("rs-a")], &["nginx:1.25"])).await;

        assert!(discovery.find_pods("nginx", NS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replica_count_uses_observed_status() {
        let (cluster, discovery) = setup().await;
        let mut d = deployment("nginx", 3);
        // Desired differs from observed
        d.spec.as_mut().unwrap().replicas = Some(5);
        cluster.add_deployment(d).await.unwrap();
        assert_eq!(discovery.replica_count("nginx", NS).await.unwrap(), 3);

        let mut d = deployment("redis", 2);
        d.status = None;
        cluster.add_deployment(d).await.unwrap();
        assert_eq!(discovery.replica_count("redis", NS).await.unwrap(), 0);

        assert!(matches!(
            discovery.replica_count("ghost", NS).await.unwrap_err(),
            ControllerError::DeploymentNotFound { .. }
        ));
    }
}
