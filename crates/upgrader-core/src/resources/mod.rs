pub mod selector;
pub mod upgrade;

pub use selector::{labels_match, selector_string, single_owner_uid};
pub use upgrade::{
    DeploymentRef, ImageRef, UpgradePhase, UpgradeRequest, UpgradeSpec, UpgradeStatus,
    UpgradeType, UPGRADE_GROUP, UPGRADE_KIND, UPGRADE_VERSION,
};

use crate::{GroupVersionKind, ObjectKey, ResourceKey};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Base validation for all resources
pub fn validate_base(metadata: &ObjectMeta) -> Result<(), ResourceError> {
    match &metadata.name {
        None => return Err(ResourceError::MissingField("metadata.name".to_string())),
        Some(name) if !is_valid_name(name) => {
            return Err(ResourceError::InvalidName(name.clone()))
        }
        Some(_) => {}
    }

    if metadata.namespace.as_deref().unwrap_or_default().is_empty() {
        return Err(ResourceError::MissingField("metadata.namespace".to_string()));
    }

    Ok(())
}

/// Trait for the namespaced Kubernetes resources the controller reads or writes
pub trait Resource: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    fn gvk(&self) -> GroupVersionKind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Get the ResourceKey
    fn resource_key(&self) -> Result<ResourceKey, ResourceError> {
        let metadata = self.metadata();
        let name = metadata
            .name
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;
        let namespace = metadata.namespace.clone().unwrap_or_default();

        Ok(ResourceKey::new(self.gvk(), namespace, name))
    }

    fn object_key(&self) -> Result<ObjectKey, ResourceError> {
        self.resource_key().map(|k| k.object_key())
    }

    fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    /// Validate the resource
    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(self.metadata())
    }
}

/// Resource-related errors
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Validate a Kubernetes resource name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }

    bytes
        .iter()
        .all(|&b| edge_ok(b) || b == b'-' || b == b'.')
}

impl Resource for Pod {
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::pod()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        match &self.spec {
            Some(spec) if spec.containers.is_empty() => Err(ResourceError::ValidationFailed(
                "Pod must have at least one container".to_string(),
            )),
            Some(_) => Ok(()),
            None => Err(ResourceError::MissingField("spec".to_string())),
        }
    }
}

impl Resource for Deployment {
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::deployment()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for ReplicaSet {
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::replica_set()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for UpgradeRequest {
    fn gvk(&self) -> GroupVersionKind {
        UpgradeRequest::api_gvk()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        let target = &self.spec.deployment_ref;
        if target.name.is_empty() || target.namespace.is_empty() {
            return Err(ResourceError::MissingField(
                "spec.deploymentRef.{name,namespace}".to_string(),
            ));
        }
        if self.spec.upgrade_replicas < 0 {
            return Err(ResourceError::ValidationFailed(format!(
                "spec.upgradeReplicas must not be negative, got {}",
                self.spec.upgrade_replicas
            )));
        }
        if self.spec.images.iter().any(|i| i.image.is_empty()) {
            return Err(ResourceError::ValidationFailed(
                "spec.images entries must name an image".to_string(),
            ));
        }

        Ok(())
    }
}
