use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::update::{de_lines, de_percent};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Position in the lifecycle. Both terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid workflow status: {}", s)),
        }
    }
}

/// How the backend should drive the agents for a submission.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowMode {
    /// Analyze and act on the repository from detected patterns alone.
    #[default]
    SelfContained,
    /// Guide the agents with a user-supplied task prompt.
    PromptDriven,
}

impl WorkflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfContained => "self-contained",
            Self::PromptDriven => "prompt-driven",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "self-contained" | "self_contained" => Ok(Self::SelfContained),
            "prompt-driven" | "prompt_driven" => Ok(Self::PromptDriven),
            _ => Err(format!(
                "Invalid workflow mode '{}'. Valid values: self-contained, prompt-driven",
                s
            )),
        }
    }
}

/// One line of the activity log, stamped with local receipt time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub line: String,
}

impl LogEntry {
    pub fn new(at: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            at,
            line: line.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.line)
    }
}

/// A submitted orchestration job as observed by the client.
///
/// `id`, `source_url`, `prompt` and `mode` are fixed at creation. Everything
/// else changes only through [`crate::reconcile::apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub source_url: String,
    pub prompt: Option<String>,
    pub mode: WorkflowMode,
    pub status: WorkflowStatus,
    pub progress: u8,
    pub log: Vec<LogEntry>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Fresh record for a workflow the backend just accepted.
    pub fn pending(
        id: impl Into<String>,
        source_url: impl Into<String>,
        prompt: Option<String>,
        mode: WorkflowMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            prompt,
            mode,
            status: WorkflowStatus::Pending,
            progress: 0,
            log: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `owner/repo` for display, falling back to the raw URL.
    pub fn repo_name(&self) -> String {
        repo_name(&self.source_url)
    }
}

/// Entry returned by the backend's workflow listing.
///
/// The backend has shipped several field spellings over time, so the
/// aliases below accept all of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSummary {
    #[serde(alias = "workflow_id", alias = "workflowId")]
    pub id: String,
    #[serde(alias = "repository_url", alias = "githubUrl", alias = "sourceUrl", default)]
    pub source_url: String,
    #[serde(alias = "task_prompt", default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub mode: Option<WorkflowMode>,
    pub status: WorkflowStatus,
    #[serde(default, deserialize_with = "de_percent")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "logs", alias = "logLines", deserialize_with = "de_lines")]
    pub log_lines: Vec<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowSummary {
    /// Mode as recorded, or inferred from whether a prompt was stored.
    pub fn effective_mode(&self) -> WorkflowMode {
        self.mode.unwrap_or_else(|| match &self.prompt {
            Some(p) if !p.trim().is_empty() => WorkflowMode::PromptDriven,
            _ => WorkflowMode::SelfContained,
        })
    }

    /// Build a frozen record for display. Log lines carry the summary's
    /// last update time since the backend does not stamp them.
    pub fn into_workflow(self) -> Workflow {
        let mode = self.effective_mode();
        let updated_at = self.updated_at.unwrap_or(self.created_at);
        let progress = match self.status {
            WorkflowStatus::Completed => 100,
            _ => self.progress.unwrap_or(0),
        };
        Workflow {
            log: self
                .log_lines
                .into_iter()
                .map(|line| LogEntry::new(updated_at, line))
                .collect(),
            id: self.id,
            source_url: self.source_url,
            prompt: self.prompt,
            mode,
            status: self.status,
            progress,
            error: self.error,
            created_at: self.created_at,
            updated_at,
        }
    }

    pub fn repo_name(&self) -> String {
        repo_name(&self.source_url)
    }
}

/// Last two path segments of a repository URL (`owner/repo`).
pub fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let parts: Vec<&str> = trimmed.rsplit('/').take(2).collect();
    match parts.as_slice() {
        [repo, owner] if !repo.is_empty() && !owner.is_empty() && !owner.ends_with(':') => {
            format!("{}/{}", owner, repo)
        }
        _ => url.to_string(),
    }
}
