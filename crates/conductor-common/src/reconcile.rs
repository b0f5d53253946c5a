//! Merge of inbound progress updates into workflow state.
//!
//! [`apply`] is the only function allowed to mutate a [`Workflow`] after
//! creation. It is pure: the receipt time is passed in, so replaying the same
//! `(state, update, time)` always yields the same result.
//!
//! Rules, in order:
//! 1. updates for another workflow id are rejected;
//! 2. a status ranked below the held one is rejected as stale, and a terminal
//!    status never changes into a different one;
//! 3. progress only moves forward while non-terminal, snaps to 100 on
//!    completion and freezes on failure;
//! 4. message and log lines are appended unless the same text already appears
//!    in the last [`DEDUP_WINDOW`] entries;
//! 5. the first reported error sticks and is echoed as an `Error: ...` line.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::update::ProgressUpdate;
use crate::workflow::{LogEntry, Workflow, WorkflowStatus};

/// How many trailing log entries are checked for duplicates.
pub const DEDUP_WINDOW: usize = 32;

/// Why an update was not applied. Never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("Update for workflow {got} ignored; active workflow is {expected}")]
    ForeignWorkflow { expected: String, got: String },

    #[error("Stale update discarded: reported {reported} while {held} is held")]
    StaleStatus {
        held: WorkflowStatus,
        reported: WorkflowStatus,
    },
}

/// Fold `update` into `current`, returning the next state.
pub fn apply(
    current: &Workflow,
    update: &ProgressUpdate,
    received_at: DateTime<Utc>,
) -> Result<Workflow, Rejected> {
    if update.workflow_id != current.id {
        return Err(Rejected::ForeignWorkflow {
            expected: current.id.clone(),
            got: update.workflow_id.clone(),
        });
    }

    let mut next = current.clone();

    if let Some(reported) = update.status {
        let held = current.status;
        let regressed = reported.rank() < held.rank();
        let terminal_flip = held.is_terminal() && reported != held;
        if regressed || terminal_flip {
            return Err(Rejected::StaleStatus { held, reported });
        }
        next.status = reported;
    }

    next.progress = merge_progress(current, next.status, update.progress);

    if let Some(message) = update.message.as_deref() {
        push_line(&mut next.log, message, received_at);
    }
    for line in &update.log_lines {
        push_line(&mut next.log, line, received_at);
    }

    if let Some(error) = update
        .error
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        if next.error.is_none() {
            next.error = Some(error.to_string());
        }
        push_line(&mut next.log, &format!("Error: {}", error), received_at);
    }

    next.updated_at = received_at.max(current.updated_at);
    Ok(next)
}

fn merge_progress(current: &Workflow, status: WorkflowStatus, reported: Option<u8>) -> u8 {
    let held = current.progress;
    match status {
        WorkflowStatus::Completed => 100,
        WorkflowStatus::Failed if current.status == WorkflowStatus::Failed => held,
        WorkflowStatus::Failed => reported.map_or(held, |p| p.min(100).max(held)),
        WorkflowStatus::Pending | WorkflowStatus::Running => match reported {
            Some(p) if p >= held => p.min(100),
            _ => held,
        },
    }
}

fn push_line(log: &mut Vec<LogEntry>, text: &str, at: DateTime<Utc>) {
    let line = text.trim_end();
    if line.trim().is_empty() {
        return;
    }
    let duplicate = log.iter().rev().take(DEDUP_WINDOW).any(|e| e.line == line);
    if !duplicate {
        log.push(LogEntry::new(at, line));
    }
}
