use crate::error::{ControllerError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Connection settings for `ApiClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API server URL (e.g., "https://127.0.0.1:6443")
    pub api_url: String,
    /// Bearer token sent with every request
    pub bearer_token: Option<String>,
    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
    /// Skip TLS verification (kubeconfig `insecure-skip-tls-verify`)
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            bearer_token: None,
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ControllerError::invalid_config(
                format!("API URL '{}' has no http(s) scheme", self.api_url),
                "Use a full URL such as https://127.0.0.1:6443",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ControllerError::invalid_config(
                "request timeout must be greater than zero",
                "Pass a timeout such as --request-timeout 30s",
            ));
        }
        Ok(())
    }

    /// `$KUBECONFIG`, falling back to `~/.kube/config`
    pub fn default_kubeconfig_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("KUBECONFIG").filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
    }

    /// Build a config from the current context of a kubeconfig file
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ControllerError::invalid_config(
                format!("cannot read kubeconfig {}: {}", path.display(), e),
                "Pass --kubeconfig with a readable file, or --api-url to skip kubeconfig",
            )
        })?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&raw).map_err(|e| {
            ControllerError::invalid_config(
                format!("cannot parse kubeconfig {}: {}", path.display(), e),
                "Check the file is a valid kubeconfig (kubectl config view)",
            )
        })?;
        kubeconfig.into_client_config()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: String,
    #[serde(default)]
    contexts: Vec<Named<ContextEntry>>,
    #[serde(default)]
    clusters: Vec<Named<ClusterEntry>>,
    #[serde(default)]
    users: Vec<Named<UserEntry>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "context", alias = "cluster", alias = "user")]
    value: T,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
struct UserEntry {
    #[serde(default)]
    token: Option<String>,
}

fn find<'a, T>(entries: &'a [Named<T>], name: &str) -> Option<&'a T> {
    entries.iter().find(|e| e.name == name).map(|e| &e.value)
}

impl Kubeconfig {
    fn into_client_config(self) -> Result<ClientConfig> {
        let context = find(&self.contexts, &self.current_context).ok_or_else(|| {
            ControllerError::invalid_config(
                format!("current context '{}' not found", self.current_context),
                "Select a context with `kubectl config use-context`",
            )
        })?;
        let cluster = find(&self.clusters, &context.cluster).ok_or_else(|| {
            ControllerError::invalid_config(
                format!("cluster '{}' not found", context.cluster),
                "The context references a cluster missing from the clusters list",
            )
        })?;
        let token = find(&self.users, &context.user).and_then(|u| u.token.clone());

        debug!(
            context = %self.current_context,
            server = %cluster.server,
            has_token = token.is_some(),
            "Loaded kubeconfig"
        );

        let config = ClientConfig {
            api_url: cluster.server.trim_end_matches('/').to_string(),
            bearer_token: token,
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: cluster.insecure_skip_tls_verify,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
contexts:
  - name: dev
    context:
      cluster: kind-dev
      user: admin
  - name: prod
    context:
      cluster: prod
      user: ops
clusters:
  - name: kind-dev
    cluster:
      server: https://127.0.0.1:6443/
      insecure-skip-tls-verify: true
  - name: prod
    cluster:
      server: https://10.0.0.1:6443
users:
  - name: admin
    user:
      token: s3cret
  - name: ops
    user: {}
"#;

    fn write_kubeconfig(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_kubeconfig_uses_current_context() {
        let file = write_kubeconfig(KUBECONFIG);
        let config = ClientConfig::from_kubeconfig(file.path()).unwrap();

        assert_eq!(config.api_url, "https://127.0.0.1:6443");
        assert_eq!(config.bearer_token.as_deref(), Some("s3cret"));
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_from_kubeconfig_missing_context() {
        let file = write_kubeconfig(&KUBECONFIG.replace("current-context: dev", "current-context: qa"));
        let err = ClientConfig::from_kubeconfig(file.path()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_from_kubeconfig_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::from_kubeconfig(&dir.path().join("nope"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bare_host() {
        assert!(ClientConfig::new("127.0.0.1:6443").validate().is_err());
        assert!(ClientConfig::new("http://127.0.0.1:6443").validate().is_ok());
        assert!(ClientConfig::new("http://127.0.0.1:6443")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
