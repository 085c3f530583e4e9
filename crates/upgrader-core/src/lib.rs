//! Upgrader Core - Resource types for the image upgrade controller
//!
//! This crate provides:
//! - The `UpGrade` custom resource and its status lifecycle
//! - Error types with miette diagnostics
//! - Resource keys and API path helpers
//! - Label selector and ownership helpers
//! - Serialization helpers

pub mod error;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{Result, UpgraderError};
pub use resources::{
    is_valid_name, DeploymentRef, ImageRef, Resource, ResourceError, UpgradePhase,
    UpgradeRequest, UpgradeSpec, UpgradeStatus, UpgradeType,
};
pub use types::{GroupVersionKind, ObjectKey, ResourceKey};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
pub use k8s_openapi::api::core::v1::Pod;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Serialize a resource to JSON
pub fn to_json<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string(resource).map_err(|e| {
        UpgraderError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        UpgraderError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        UpgraderError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        UpgraderError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_serialization() {
        let req = UpgradeRequest::new("default", "roll-nginx", UpgradeSpec::default());

        let json = to_json(&req).unwrap();
        assert!(json.contains("roll-nginx"));
        assert!(json.contains("\"kind\":\"UpGrade\""));

        let back: UpgradeRequest = from_json(&json).unwrap();
        assert_eq!(back.metadata.name, Some("roll-nginx".to_string()));
    }

    #[test]
    fn test_yaml_errors_are_serialization_errors() {
        let err = from_yaml::<UpgradeRequest>("spec: [not, a, map]").unwrap_err();
        assert!(matches!(err, UpgraderError::SerializationError { .. }));
    }
}
