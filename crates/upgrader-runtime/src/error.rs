use miette::Diagnostic;
use thiserror::Error;

/// Error type for cluster access and reconciliation
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    /// Object missing from the cluster
    #[error("Resource not found: {resource_key}")]
    #[diagnostic(
        code(upgrader::runtime::resource_not_found),
        help("The object may have been deleted since the reconcile was triggered")
    )]
    ResourceNotFound {
        #[allow(unused)]
        resource_key: String,
    },

    /// Target Deployment of an upgrade request does not exist
    #[error("Deployment {namespace}/{name} not found")]
    #[diagnostic(
        code(upgrader::runtime::deployment_not_found),
        help("Check spec.deploymentRef of the UpGrade request. The Deployment must live in the referenced namespace")
    )]
    DeploymentNotFound {
        #[allow(unused)]
        namespace: String,
        #[allow(unused)]
        name: String,
    },

    /// Optimistic concurrency failure on update
    #[error("Conflict updating {resource_key}")]
    #[diagnostic(
        code(upgrader::runtime::conflict),
        help("The object was modified concurrently. The reconcile will be retried against the latest version")
    )]
    Conflict {
        #[allow(unused)]
        resource_key: String,
    },

    /// API server call failed
    #[error("API request failed: {message}")]
    #[diagnostic(
        code(upgrader::runtime::api_error),
        help("Verify the API server is reachable and the credentials allow this operation")
    )]
    ApiError {
        #[allow(unused)]
        message: String,
    },

    /// Image patch rejected for a Pod
    #[error("Failed to upgrade pod {pod_name}: {message}")]
    #[diagnostic(
        code(upgrader::runtime::pod_upgrade_failed),
        help("Check that spec.images does not list more images than the Pod has containers, and that the image references are valid")
    )]
    PodUpgradeFailed {
        #[allow(unused)]
        pod_name: String,
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(upgrader::runtime::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] upgrader_core::UpgraderError),

    /// Internal error
    #[error("Internal controller error: {message}")]
    #[diagnostic(
        code(upgrader::runtime::internal_error),
        help("This is likely a bug in upgrader-runtime. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    pub fn resource_not_found(resource_key: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_key: resource_key.into(),
        }
    }

    pub fn deployment_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DeploymentNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn conflict(resource_key: impl Into<String>) -> Self {
        Self::Conflict {
            resource_key: resource_key.into(),
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
        }
    }

    pub fn pod_upgrade_failed(pod_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PodUpgradeFailed {
            pod_name: pod_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the trigger loop should run the reconcile again.
    ///
    /// A rejected Pod patch already marked the request `Failure`; retrying
    /// it would repeat work on Pods that were left half upgraded.
    pub fn should_requeue(&self) -> bool {
        !matches!(self, ControllerError::PodUpgradeFailed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ControllerError::ResourceNotFound { .. } | ControllerError::DeploymentNotFound { .. }
        )
    }
}
