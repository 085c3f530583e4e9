use crate::error::Result;
use async_trait::async_trait;
use json_patch::Patch;
use std::collections::BTreeMap;
use upgrader_core::{Deployment, ObjectKey, Pod, ReplicaSet, UpgradeRequest};

/// Access to the cluster state the upgrade controller reads and writes
///
/// Implemented over HTTP by `ApiClient` and in memory by `MockCluster`.
/// Every call goes to the cluster; implementations keep no cache.
/// Missing objects are reported as `ControllerError::ResourceNotFound`.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    // --- Upgrade requests ---

    /// Fetch one UpGrade request
    async fn get_upgrade_request(&self, key: &ObjectKey) -> Result<UpgradeRequest>;

    /// List UpGrade requests, across all namespaces when `namespace` is None
    async fn list_upgrade_requests(&self, namespace: Option<&str>) -> Result<Vec<UpgradeRequest>>;

    /// Replace the status subresource, returning the stored object
    async fn update_upgrade_request_status(
        &self,
        request: &UpgradeRequest,
    ) -> Result<UpgradeRequest>;

    // --- Workloads (read-only) ---

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// List ReplicaSets carrying every label in `selector`
    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ReplicaSet>>;

    /// List all Pods in a namespace, unfiltered, in API order
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    // --- Mutation ---

    /// Apply a JSON-Patch to a Pod. The patch applies completely or not at all.
    async fn patch_pod(&self, namespace: &str, name: &str, patch: &Patch) -> Result<Pod>;
}
