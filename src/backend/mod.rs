//! Client for the orchestration backend.
//!
//! [`Backend`] is the seam the controller, history store and CLI commands
//! talk through. [`HttpBackend`] speaks the real HTTP API; tests substitute
//! an in-memory implementation.

pub mod types;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use conductor_common::{ProgressUpdate, WorkflowSummary};

use crate::context::{ContextConfig, ContextQuery, SearchResponse, SearchResult};
use crate::errors::BackendError;
pub use types::{CreateWorkflowRequest, HealthCheck, HealthReport};
use types::{CreateWorkflowResponse, Envelope, StatusPayload, WorkflowList};

/// Longest slice of a response body quoted back in an error.
const ERROR_BODY_LIMIT: usize = 200;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Start a workflow and return the id the backend assigned.
    async fn create(&self, request: &CreateWorkflowRequest) -> Result<String, BackendError>;

    /// Current status of one workflow, already shaped as an update.
    async fn get_status(&self, workflow_id: &str) -> Result<ProgressUpdate, BackendError>;

    /// Past and present workflows, newest first.
    async fn list(&self) -> Result<Vec<WorkflowSummary>, BackendError>;

    async fn health(&self) -> Result<HealthReport, BackendError>;

    async fn search_context(&self, query: &ContextQuery)
    -> Result<Vec<SearchResult>, BackendError>;

    async fn context_config(&self) -> Result<ContextConfig, BackendError>;

    async fn update_context_config(&self, config: &ContextConfig) -> Result<(), BackendError>;

    /// Push channel URL for a workflow, or `None` when push is disabled.
    fn stream_url(&self, workflow_id: &str) -> Option<String>;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub api_url: String,
    pub ws_url: Option<String>,
    pub api_key: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub push: bool,
}

impl BackendSettings {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ws_url: None,
            api_key: None,
            api_token: None,
            timeout: Duration::from_secs(30),
            push: true,
        }
    }

    /// Base URL for push channels: the configured one, else the API URL with
    /// its scheme swapped to `ws`/`wss`.
    pub fn stream_base(&self) -> String {
        if let Some(ws) = &self.ws_url {
            return ws.trim_end_matches('/').to_string();
        }
        let api = self.api_url.trim_end_matches('/');
        if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            api.to_string()
        }
    }
}

pub struct HttpBackend {
    client: reqwest::Client,
    settings: BackendSettings,
}

impl HttpBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("conductor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::Unreachable)?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.settings.api_url, path);
        let mut req = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(key) = &self.settings.api_key {
            req = req.header("X-API-Key", key);
        }
        if let Some(token) = &self.settings.api_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, BackendError> {
        let resp = req.send().await.map_err(BackendError::Unreachable)?;
        let status = resp.status();
        let body = resp.text().await.map_err(BackendError::Unreachable)?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "backend response");

        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body)
            && value.get("success") == Some(&serde_json::Value::Bool(false))
        {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body)
        .map_err(|e| BackendError::Malformed(format!("{} in '{}'", e, truncate(body))))
}

/// Pull a readable message out of an error body.
///
/// The backend reports failures as `{"error": ...}`, `{"detail": ...}` or
/// `{"message": ...}`; anything else is quoted verbatim.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return s.trim().to_string();
                }
                Some(serde_json::Value::Object(inner)) => {
                    if let Some(serde_json::Value::String(s)) = inner.get("message") {
                        return s.clone();
                    }
                }
                _ => {}
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        truncate(trimmed)
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= ERROR_BODY_LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create(&self, request: &CreateWorkflowRequest) -> Result<String, BackendError> {
        let req = self.request(Method::POST, "/api/workflow").json(request);
        let resp: CreateWorkflowResponse = self.send_json(req).await?;
        let id = resp
            .workflow_id()
            .ok_or_else(|| BackendError::Malformed("response carried no workflow id".into()))?;
        tracing::info!(workflow_id = %id, repository = %request.repository_url, "workflow created");
        Ok(id)
    }

    async fn get_status(&self, workflow_id: &str) -> Result<ProgressUpdate, BackendError> {
        let req = self.request(Method::GET, &format!("/api/workflows/{}", workflow_id));
        let payload: Envelope<StatusPayload> = self.send_json(req).await?;
        Ok(payload.into_inner().into_update(workflow_id))
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, BackendError> {
        let req = self.request(Method::GET, "/api/workflows");
        let list: WorkflowList = self.send_json(req).await?;
        Ok(list.into_sorted())
    }

    async fn health(&self) -> Result<HealthReport, BackendError> {
        let resp = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(BackendError::Unreachable)?;
        let status = resp.status();
        let body = resp.text().await.map_err(BackendError::Unreachable)?;
        // An unhealthy backend answers 503 with the same report shape.
        if (status.is_success() || status == StatusCode::SERVICE_UNAVAILABLE)
            && let Ok(report) = serde_json::from_str::<HealthReport>(&body)
        {
            return Ok(report);
        }
        if status.is_success() {
            return decode(&body);
        }
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message: error_message(&body, status),
        })
    }

    async fn search_context(
        &self,
        query: &ContextQuery,
    ) -> Result<Vec<SearchResult>, BackendError> {
        let req = self.request(Method::POST, "/api/context/search").json(query);
        let resp: SearchResponse = self.send_json(req).await?;
        Ok(resp.results)
    }

    async fn context_config(&self) -> Result<ContextConfig, BackendError> {
        let req = self.request(Method::GET, "/api/admin/config");
        let config: Envelope<ContextConfig> = self.send_json(req).await?;
        Ok(config.into_inner())
    }

    async fn update_context_config(&self, config: &ContextConfig) -> Result<(), BackendError> {
        let req = self.request(Method::POST, "/api/admin/config").json(config);
        let _: serde_json::Value = self.send_json(req).await?;
        Ok(())
    }

    fn stream_url(&self, workflow_id: &str) -> Option<String> {
        if !self.settings.push {
            return None;
        }
        Some(format!(
            "{}/ws/workflows/{}",
            self.settings.stream_base(),
            workflow_id
        ))
    }
}
