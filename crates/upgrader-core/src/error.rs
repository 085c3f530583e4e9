// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for upgrade request handling
#[derive(Error, Debug, Diagnostic)]
pub enum UpgraderError {
    /// Status change not allowed by the upgrade lifecycle
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    #[diagnostic(
        code(upgrader::invalid_transition),
        help("Upgrade status only moves forward: unset -> Running -> Successful | Failure. A Successful request is final")
    )]
    InvalidTransition {
        #[allow(unused)]
        from: String,
        #[allow(unused)]
        to: String,
    },

    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(code(upgrader::invalid_resource), help("{suggestion}"))]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(upgrader::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(upgrader::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, UpgraderError>;

impl UpgraderError {
    /// Create an InvalidTransition error
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = UpgraderError::invalid_transition("Successful", "Running");
        assert!(matches!(err, UpgraderError::InvalidTransition { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid status transition: cannot move from Successful to Running"
        );

        let err = UpgraderError::invalid_resource(
            "spec.deploymentRef.name is empty",
            "Set the name of the Deployment to upgrade",
        );
        assert!(matches!(err, UpgraderError::InvalidResource { .. }));
    }
}
