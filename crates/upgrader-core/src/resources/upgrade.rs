//! The `UpGrade` custom resource and its status lifecycle.

use crate::error::{Result, UpgraderError};
use crate::types::{GroupVersionKind, ObjectKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub const UPGRADE_GROUP: &str = "devops-engineer.com.cn";
pub const UPGRADE_VERSION: &str = "v1alpha1";
pub const UPGRADE_KIND: &str = "UpGrade";

/// Declarative request to roll new images onto some Pods of a Deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: UpgradeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UpgradeStatus>,
}

fn default_api_version() -> String {
    format!("{}/{}", UPGRADE_GROUP, UPGRADE_VERSION)
}

fn default_kind() -> String {
    UPGRADE_KIND.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSpec {
    #[serde(rename = "type", default)]
    pub type_: UpgradeType,
    #[serde(default)]
    pub deployment_ref: DeploymentRef,
    /// Number of Pods to upgrade; 0 means "as many as the Deployment runs"
    #[serde(default)]
    pub upgrade_replicas: i32,
    /// Target images, index N is applied to container N
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image: String,
}

impl ImageRef {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

/// Kind of work a request asks for. Only `upgrade` is acted on; anything
/// else is carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpgradeType {
    Upgrade,
    Other(String),
}

impl Default for UpgradeType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for UpgradeType {
    fn from(s: String) -> Self {
        if s == "upgrade" {
            Self::Upgrade
        } else {
            Self::Other(s)
        }
    }
}

impl From<UpgradeType> for String {
    fn from(t: UpgradeType) -> Self {
        match t {
            UpgradeType::Upgrade => "upgrade".to_string(),
            UpgradeType::Other(s) => s,
        }
    }
}

/// Observed progress of an upgrade request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradePhase {
    Running,
    Successful,
    Failure,
}

impl UpgradePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradePhase::Running => "Running",
            UpgradePhase::Successful => "Successful",
            UpgradePhase::Failure => "Failure",
        }
    }

    /// Whether the lifecycle allows moving from `from` to `to`.
    ///
    /// `Running -> Running` covers a pass retried after a failed status write.
    /// `Failure -> Running` covers a request re-triggered by an edit.
    pub fn can_transition(from: Option<UpgradePhase>, to: UpgradePhase) -> bool {
        use UpgradePhase::*;
        matches!(
            (from, to),
            (None, Running)
                | (Some(Running), Running)
                | (Some(Running), Successful)
                | (Some(Running), Failure)
                | (Some(Failure), Running)
        )
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UpgradePhase {
    type Err = UpgraderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Running" => Ok(UpgradePhase::Running),
            "Successful" => Ok(UpgradePhase::Successful),
            "Failure" => Ok(UpgradePhase::Failure),
            other => Err(UpgraderError::invalid_resource(
                format!("unknown upgrade status '{}'", other),
                "Valid values are Running, Successful and Failure",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeStatus {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<UpgradeType>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_phase_as_none"
    )]
    pub status: Option<UpgradePhase>,
    /// Number of Pods the last successful pass upgraded
    #[serde(default)]
    pub upgrade_replicas: i32,
}

/// Empty and unrecognised phases read as unset, so the next pass starts the
/// request over from `Running`
fn empty_phase_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<UpgradePhase>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => match s.parse() {
            Ok(phase) => Ok(Some(phase)),
            Err(_) => {
                warn!(status = %s, "Unknown upgrade status, treating it as unset");
                Ok(None)
            }
        },
    }
}

impl UpgradeStatus {
    /// Move to `to`, rejecting anything the lifecycle does not allow
    pub fn transition(&mut self, to: UpgradePhase) -> Result<()> {
        if !UpgradePhase::can_transition(self.status, to) {
            let from = self.status.map(|p| p.as_str()).unwrap_or("unset");
            return Err(UpgraderError::invalid_transition(from, to.as_str()));
        }
        self.status = Some(to);
        Ok(())
    }
}

impl UpgradeRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: UpgradeSpec) -> Self {
        let metadata = ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        };
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            spec,
            status: None,
        }
    }

    pub fn api_gvk() -> GroupVersionKind {
        GroupVersionKind::new(UPGRADE_GROUP, UPGRADE_VERSION, UPGRADE_KIND)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            self.metadata.namespace.clone().unwrap_or_default(),
            self.metadata.name.clone().unwrap_or_default(),
        )
    }

    pub fn phase(&self) -> Option<UpgradePhase> {
        self.status.as_ref().and_then(|s| s.status)
    }

    pub fn status_mut(&mut self) -> &mut UpgradeStatus {
        self.status.get_or_insert_with(UpgradeStatus::default)
    }

    pub fn is_upgrade(&self) -> bool {
        self.spec.type_ == UpgradeType::Upgrade
    }

    /// Images in container order; empty unless the request is an upgrade
    pub fn image_list(&self) -> Vec<String> {
        if !self.is_upgrade() {
            return Vec::new();
        }
        self.spec.images.iter().map(|i| i.image.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: devops-engineer.com.cn/v1alpha1
kind: UpGrade
metadata:
  name: roll-nginx
  namespace: default
spec:
  type: upgrade
  deploymentRef:
    name: nginx
    namespace: web
  upgradeReplicas: 2
  images:
    - image: nginx:1.27
    - image: busybox:1.36
status:
  status: ""
"#;

    #[test]
    fn test_parse_manifest() {
        let req: UpgradeRequest = serde_yaml::from_str(MANIFEST).unwrap();
        assert!(req.is_upgrade());
        assert_eq!(req.spec.deployment_ref.name, "nginx");
        assert_eq!(req.spec.deployment_ref.namespace, "web");
        assert_eq!(req.spec.upgrade_replicas, 2);
        assert_eq!(req.image_list(), vec!["nginx:1.27", "busybox:1.36"]);
        assert_eq!(req.phase(), None);
        assert_eq!(req.key(), ObjectKey::new("default", "roll-nginx"));
    }

    #[test]
    fn test_unknown_type_has_no_images() {
        let mut req: UpgradeRequest = serde_yaml::from_str(MANIFEST).unwrap();
        req.spec.type_ = UpgradeType::from("rollback".to_string());
        assert!(!req.is_upgrade());
        assert!(req.image_list().is_empty());

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["spec"]["type"], "rollback");
    }

    #[test]
    fn test_status_serialization_uses_wire_names() {
        let status = UpgradeStatus {
            type_: Some(UpgradeType::Upgrade),
            status: Some(UpgradePhase::Successful),
            upgrade_replicas: 3,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "upgrade");
        assert_eq!(json["status"], "Successful");
        assert_eq!(json["upgradeReplicas"], 3);
    }

    #[test]
    fn test_lifecycle_forward_transitions() {
        let mut status = UpgradeStatus::default();
        status.transition(UpgradePhase::Running).unwrap();
        status.transition(UpgradePhase::Successful).unwrap();
        assert_eq!(status.status, Some(UpgradePhase::Successful));

        let mut status = UpgradeStatus::default();
        status.transition(UpgradePhase::Running).unwrap();
        status.transition(UpgradePhase::Failure).unwrap();
        // An edited request may run again after a failure
        status.transition(UpgradePhase::Running).unwrap();
    }

    #[test]
    fn test_successful_is_final() {
        let mut status = UpgradeStatus {
            status: Some(UpgradePhase::Successful),
            ..Default::default()
        };
        let err = status.transition(UpgradePhase::Running).unwrap_err();
        assert!(matches!(err, UpgraderError::InvalidTransition { .. }));
        assert!(status.transition(UpgradePhase::Failure).is_err());
        assert_eq!(status.status, Some(UpgradePhase::Successful));
    }

    #[test]
    fn test_unknown_status_reads_as_unset() {
        let manifest = MANIFEST.replace(r#"status: """#, "status: Pending");
        let req: UpgradeRequest = serde_yaml::from_str(&manifest).unwrap();
        assert_eq!(req.phase(), None);

        let mut status = req.status.unwrap_or_default();
        status.transition(UpgradePhase::Running).unwrap();
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut status = UpgradeStatus::default();
        assert!(status.transition(UpgradePhase::Successful).is_err());
        assert!(status.transition(UpgradePhase::Failure).is_err());
        assert_eq!(status.status, None);
    }
}
