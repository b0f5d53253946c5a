//! Wire types for the orchestration backend's HTTP API.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use conductor_common::update::{de_lines, de_percent};
use conductor_common::{ProgressUpdate, WorkflowMode, WorkflowStatus, WorkflowSummary};

/// Body of `POST /api/workflow`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateWorkflowRequest {
    pub repository_url: String,
    pub task_prompt: Option<String>,
    pub mode: WorkflowMode,
}

/// Response of `POST /api/workflow`. The backend has answered with
/// `{workflow_id}`, `{id}` and `{success, data: {workflowId}}` at different
/// times; [`CreateWorkflowResponse::workflow_id`] picks whichever is present.
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowResponse {
    #[serde(default, deserialize_with = "de_opt_id")]
    workflow_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default)]
    data: Option<CreatedData>,
}

#[derive(Debug, Deserialize)]
struct CreatedData {
    #[serde(
        default,
        alias = "workflow_id",
        alias = "id",
        rename = "workflowId",
        deserialize_with = "de_opt_id"
    )]
    workflow_id: Option<String>,
}

impl CreateWorkflowResponse {
    pub fn workflow_id(self) -> Option<String> {
        self.data
            .and_then(|d| d.workflow_id)
            .or(self.workflow_id)
            .or(self.id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id != "unknown")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}

/// Either `{success, data: T}` or a bare `T`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(inner) => inner,
        }
    }
}

/// Body of `GET /api/workflows`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WorkflowList {
    Wrapped { data: Vec<WorkflowSummary> },
    Named { workflows: Vec<WorkflowSummary> },
    Bare(Vec<WorkflowSummary>),
}

impl WorkflowList {
    /// Entries sorted newest first.
    pub fn into_sorted(self) -> Vec<WorkflowSummary> {
        let mut entries = match self {
            Self::Wrapped { data } => data,
            Self::Named { workflows } => workflows,
            Self::Bare(entries) => entries,
        };
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }
}

/// Body of `GET /api/workflows/{id}`; only the fields the poll path needs.
#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: WorkflowStatus,
    #[serde(default, deserialize_with = "de_percent")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "logLines", alias = "log_lines", deserialize_with = "de_lines")]
    pub logs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusPayload {
    /// Stamp the payload with the id it was requested for.
    pub fn into_update(self, workflow_id: &str) -> ProgressUpdate {
        ProgressUpdate {
            workflow_id: workflow_id.to_string(),
            status: Some(self.status),
            progress: self.progress,
            message: self.message,
            log_lines: self.logs,
            error: self.error,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub checks: BTreeMap<String, HealthCheck>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_uses_backend_field_names() {
        let req = CreateWorkflowRequest {
            repository_url: "https://github.com/acme/widget".into(),
            task_prompt: None,
            mode: WorkflowMode::SelfContained,
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["repository_url"], "https://github.com/acme/widget");
        assert!(json["task_prompt"].is_null());
        assert_eq!(json["mode"], "self-contained");
    }

    #[test]
    fn test_create_response_id_variants() {
        let wrapped: CreateWorkflowResponse =
            serde_json::from_str(r#"{"success":true,"data":{"workflowId":"wf-1","status":"pending"}}"#)
                .unwrap();
        assert_eq!(wrapped.workflow_id().as_deref(), Some("wf-1"));

        let direct: CreateWorkflowResponse =
            serde_json::from_str(r#"{"success":true,"workflow_id":"wf-2"}"#).unwrap();
        assert_eq!(direct.workflow_id().as_deref(), Some("wf-2"));

        let numeric: CreateWorkflowResponse = serde_json::from_str(r#"{"id":17}"#).unwrap();
        assert_eq!(numeric.workflow_id().as_deref(), Some("17"));
    }

    #[test]
    fn test_create_response_without_id_is_none() {
        let none: CreateWorkflowResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(none.workflow_id().is_none());
        let unknown: CreateWorkflowResponse =
            serde_json::from_str(r#"{"workflow_id":"unknown"}"#).unwrap();
        assert!(unknown.workflow_id().is_none());
    }

    #[test]
    fn test_envelope_accepts_wrapped_and_bare() {
        let wrapped: Envelope<StatusPayload> =
            serde_json::from_str(r#"{"success":true,"data":{"status":"running","progress":20}}"#)
                .unwrap();
        let bare: Envelope<StatusPayload> =
            serde_json::from_str(r#"{"status":"completed","progress":90}"#).unwrap();
        assert_eq!(wrapped.into_inner().status, WorkflowStatus::Running);
        assert_eq!(bare.into_inner().progress, Some(90));
    }

    #[test]
    fn test_status_payload_into_update() {
        let payload: StatusPayload = serde_json::from_str(
            r#"{"status":"failed","progress":40,"error":"clone failed","logs":"cloning\nfailed"}"#,
        )
        .unwrap();
        let update = payload.into_update("wf-1");
        assert_eq!(update.workflow_id, "wf-1");
        assert_eq!(update.status, Some(WorkflowStatus::Failed));
        assert_eq!(update.log_lines, vec!["cloning", "failed"]);
        assert_eq!(update.error.as_deref(), Some("clone failed"));
    }

    #[test]
    fn test_workflow_list_shapes_sort_newest_first() {
        let items = r#"[
            {"id":"old","repository_url":"https://github.com/a/b","status":"completed","created_at":"2026-01-01T00:00:00Z"},
            {"id":"new","repository_url":"https://github.com/a/c","status":"running","created_at":"2026-02-01T00:00:00Z"}
        ]"#;
        for body in [
            items.to_string(),
            format!(r#"{{"success":true,"data":{}}}"#, items),
            format!(r#"{{"workflows":{}}}"#, items),
        ] {
            let list: WorkflowList = serde_json::from_str(&body).unwrap();
            let ids: Vec<String> = list.into_sorted().into_iter().map(|w| w.id).collect();
            assert_eq!(ids, vec!["new", "old"]);
        }
    }

    #[test]
    fn test_health_report_parses_checks() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"degraded","service":"orchestrator","checks":{"database":{"status":"healthy"},"redis":{"status":"unhealthy","error":"timeout"}}}"#,
        )
        .unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.checks["redis"].error.as_deref(), Some("timeout"));
    }
}
