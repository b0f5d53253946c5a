use serde::{Deserialize, Deserializer, Serialize};

use crate::workflow::WorkflowStatus;

/// One inbound report about a single workflow.
///
/// Push frames and poll responses are both normalised into this shape before
/// they reach the reconciler. A `status` of `None` marks a notice that only
/// contributes log text (for example the adapter's "connected" line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(alias = "workflow_id")]
    pub workflow_id: String,
    #[serde(default)]
    pub status: Option<WorkflowStatus>,
    #[serde(default, deserialize_with = "de_percent")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        default,
        alias = "logs",
        deserialize_with = "de_lines",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub log_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// Status-bearing update with no log text.
    pub fn status(workflow_id: impl Into<String>, status: WorkflowStatus, progress: u8) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: Some(status),
            progress: Some(progress),
            message: None,
            log_lines: Vec::new(),
            error: None,
        }
    }

    /// Log-only notice that never moves status or progress on its own.
    pub fn notice(workflow_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: None,
            progress: None,
            message: Some(message.into()),
            log_lines: Vec::new(),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_log_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }
}

/// Round and clamp a reported percentage into `0..=100`.
pub fn clamp_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Accept integer or float percentages; non-finite values count as absent.
pub fn de_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite()).map(clamp_percent))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLines {
    Joined(String),
    Split(Vec<String>),
}

/// Accept log lines as an array or as one newline-separated string.
pub fn de_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawLines>::deserialize(deserializer)?;
    let lines: Vec<String> = match raw {
        None => Vec::new(),
        Some(RawLines::Joined(text)) => text.lines().map(str::to_string).collect(),
        Some(RawLines::Split(lines)) => lines,
    };
    Ok(lines
        .into_iter()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.trim().is_empty())
        .collect())
}
