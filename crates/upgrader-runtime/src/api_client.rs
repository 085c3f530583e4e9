use crate::cluster::ClusterClient;
use crate::config::ClientConfig;
use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use json_patch::Patch;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use upgrader_core::resources::selector_string;
use upgrader_core::{
    Deployment, GroupVersionKind, ObjectKey, Pod, ReplicaSet, Resource, ResourceKey,
    UpgradeRequest,
};

const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// HTTP client for a Kubernetes-compatible API server
pub struct ApiClient {
    base_url: String,
    bearer_token: Option<String>,
    client: Client,
}

/// Envelope of a LIST response
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl ApiClient {
    /// Build a client from validated configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| {
                ControllerError::invalid_config(
                    format!("failed to build HTTP client: {}", e),
                    "Check the TLS settings of the API server connection",
                )
            })?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and decode the JSON body, mapping HTTP failures
    /// onto controller errors for `what`
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ControllerError::api_error(format!("HTTP request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => ControllerError::resource_not_found(what),
                StatusCode::CONFLICT => ControllerError::conflict(what),
                _ => ControllerError::api_error(format!(
                    "{} failed with status {}: {}",
                    what, status, body
                )),
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ControllerError::api_error(format!("Failed to parse {}: {}", what, e)))
    }

    async fn get_object<T: DeserializeOwned>(&self, key: &ResourceKey) -> Result<T> {
        let url = self.url(&key.api_path());
        debug!("GET {}", url);
        self.send(self.client.get(&url), &key.to_string()).await
    }

    async fn list_objects<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);
        let list: ObjectList<serde_json::Value> = self
            .send(self.client.get(&url).query(query), path)
            .await?;

        // Decode per item so one malformed object does not hide the rest
        Ok(list
            .items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<T>(item) {
                Ok(object) => Some(object),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping undecodable list item");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ClusterClient for ApiClient {
    /// GET /apis/devops-engineer.com.cn/v1alpha1/namespaces/{namespace}/upgrades/{name}
    async fn get_upgrade_request(&self, key: &ObjectKey) -> Result<UpgradeRequest> {
        let key = ResourceKey::new(UpgradeRequest::api_gvk(), &key.namespace, &key.name);
        self.get_object(&key).await
    }

    /// GET .../upgrades, namespaced or cluster-wide
    async fn list_upgrade_requests(&self, namespace: Option<&str>) -> Result<Vec<UpgradeRequest>> {
        let gvk = UpgradeRequest::api_gvk();
        let path = match namespace {
            Some(ns) => ResourceKey::new(gvk, ns, "").collection_path(),
            None => gvk.cluster_collection_path(),
        };
        self.list_objects(&path, &[]).await
    }

    /// PUT .../namespaces/{namespace}/upgrades/{name}/status
    async fn update_upgrade_request_status(
        &self,
        request: &UpgradeRequest,
    ) -> Result<UpgradeRequest> {
        let key = request.resource_key().map_err(|e| {
            ControllerError::internal_error(format!("UpGrade request has no key: {}", e))
        })?;
        let url = self.url(&key.status_path());
        debug!("PUT {}", url);
        self.send(self.client.put(&url).json(request), &key.to_string())
            .await
    }

    /// GET /apis/apps/v1/namespaces/{namespace}/deployments/{name}
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let key = ResourceKey::new(GroupVersionKind::deployment(), namespace, name);
        self.get_object(&key).await
    }

    /// GET /apis/apps/v1/namespaces/{namespace}/replicasets?labelSelector=...
    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ReplicaSet>> {
        let path = ResourceKey::new(GroupVersionKind::replica_set(), namespace, "").collection_path();
        let mut query = Vec::new();
        if !selector.is_empty() {
            query.push(("labelSelector", selector_string(selector)));
        }
        self.list_objects(&path, &query).await
    }

    /// GET /api/v1/namespaces/{namespace}/pods
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let path = ResourceKey::new(GroupVersionKind::pod(), namespace, "").collection_path();
        self.list_objects(&path, &[]).await
    }

    /// PATCH /api/v1/namespaces/{namespace}/pods/{name} (application/json-patch+json)
    async fn patch_pod(&self, namespace: &str, name: &str, patch: &Patch) -> Result<Pod> {
        let key = ResourceKey::new(GroupVersionKind::pod(), namespace, name);
        let url = self.url(&key.api_path());
        let body = serde_json::to_vec(patch).map_err(|e| {
            ControllerError::internal_error(format!("Failed to encode JSON patch: {}", e))
        })?;
        debug!("PATCH {}", url);

        self.send(
            self.client
                .patch(&url)
                .header(CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
                .body(body),
            &key.to_string(),
        )
        .await
    }
}
