//! Firestore REST API client.
//!
//! Token caching with refresh margin, HTTP pooling, retry with backoff
//! and per-request tracing spans and metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::value::{Document, Value};

/// Store client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .map_err(|_| StoreError::auth_error("GCP_PROJECT_ID must be set"))?;

        if project_id.is_empty() {
            return Err(StoreError::auth_error("GCP_PROJECT_ID cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("STORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("STORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

/// Firestore REST API client.
pub struct StoreClient {
    http: Client,
    config: StoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for StoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl StoreClient {
    /// Create a new store client.
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let auth = Self::create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vforge-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    fn create_auth_provider() -> StoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StoreError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        let config = StoreConfig::from_env()?;
        Self::new(config).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send a request, retrying once on an expired access token.
    ///
    /// The closure builds a fresh request for the given bearer token so the
    /// retry does not need a cloneable body.
    async fn send_authorized<F>(&self, build: F) -> StoreResult<reqwest::Response>
    where
        F: Fn(String) -> reqwest::RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            if Self::is_access_token_expired(&body) {
                debug!("Access token expired, refreshing and retrying");
                self.token_cache.invalidate().await;
                let token = self.token_cache.get_token().await?;
                return Ok(build(token).send().await?);
            }
            return Err(StoreError::from_http_status(401, body));
        }

        Ok(response)
    }

    /// Get a document, or None if it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> StoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self
                .send_authorized(|token| self.http.get(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let doc: Document = response.json().await?;
                    Ok(Some(doc))
                }
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document, failing if it already exists.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let doc: Document = response.json().await?;
                    Ok(doc)
                }
                StatusCode::CONFLICT => Err(StoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Patch a document with a field mask.
    ///
    /// Only the masked fields are written; everything else is left intact.
    /// When `update_time` is given the write carries an optimistic
    /// concurrency precondition and fails with `PreconditionFailed` if the
    /// document changed since that timestamp.
    pub async fn patch_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        mask: Vec<String>,
        update_time: Option<&str>,
    ) -> StoreResult<Document> {
        let mut params: Vec<String> = mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", f))
            .collect();
        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }

        let mut url = self.document_path(collection, doc_id);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let body = Document::new(fields);

        self.execute_request("patch_document", collection, Some(doc_id), async {
            let response = self
                .send_authorized(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let doc: Document = response.json().await?;
                    Ok(doc)
                }
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let body_text = response.text().await.unwrap_or_default();
                    Err(StoreError::PreconditionFailed(body_text))
                }
                StatusCode::NOT_FOUND => {
                    Err(StoreError::not_found(format!("{}/{}", collection, doc_id)))
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Execute with retry.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("store_request", operation = %operation, collection = %collection, doc_id = %id)
        } else {
            info_span!("store_request", operation = %operation, collection = %collection)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from_response(
        status: StatusCode,
        url: &str,
        response: reqwest::Response,
    ) -> StoreError {
        let body = response.text().await.unwrap_or_default();
        StoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        let result = StoreConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn config_default_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("STORE_CONNECT_TIMEOUT_SECS");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.database_id, "(default)");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    fn token_expiry_detection() {
        assert!(StoreClient::is_access_token_expired(
            "{\"status\": \"UNAUTHENTICATED\"}"
        ));
        assert!(StoreClient::is_access_token_expired("ACCESS_TOKEN_EXPIRED"));
        assert!(!StoreClient::is_access_token_expired("PERMISSION_DENIED"));
    }
}
