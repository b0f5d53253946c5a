//! Follow a workflow until it finishes: `conductor watch <id>`.

use anyhow::Result;
use chrono::Utc;
use std::process::ExitCode;

use conductor::controller::WorkflowController;
use conductor::history::HistoryStore;
use conductor::ui::{UiMode, WorkflowUI};
use conductor_common::{ProgressUpdate, Workflow, WorkflowMode, WorkflowStatus, reconcile};

use super::Session;

pub async fn cmd_watch(session: &Session, id: &str) -> Result<ExitCode> {
    let workflow = locate(session, id).await?;
    let controller = WorkflowController::new(session.backend.clone(), session.sync_settings());
    controller.select_active(workflow);
    Ok(follow(&controller, session.output, session.verbose).await)
}

/// Find the workflow in history, or confirm it exists through its status.
async fn locate(session: &Session, id: &str) -> Result<Workflow> {
    let mut history = HistoryStore::new(session.backend.clone());
    match history.refresh().await {
        Ok(_) => {
            if let Some(summary) = history.find(id) {
                return Ok(summary.clone().into_workflow());
            }
        }
        Err(e) => tracing::warn!(error = %e, "history unavailable, asking for status directly"),
    }

    let update = session.backend.get_status(id).await?;
    tracing::debug!(workflow_id = %id, status = ?update.status, "workflow found by status");
    Ok(seed_from_status(id, &update))
}

/// Starting record for a workflow known only through its status: the
/// reported status, progress and log folded into a pending workflow.
fn seed_from_status(id: &str, update: &ProgressUpdate) -> Workflow {
    let now = Utc::now();
    let pending = Workflow::pending(
        id,
        "(unknown repository)",
        None,
        WorkflowMode::default(),
        now,
    );
    match reconcile::apply(&pending, update, now) {
        Ok(seeded) => seeded,
        Err(rejected) => {
            tracing::debug!(%rejected, "status not applied to seed");
            pending
        }
    }
}

/// Render the controller's view until the workflow stops being live.
///
/// Exit code follows the outcome: 0 completed, 1 failed, 130 when detached
/// with Ctrl-C while the workflow was still running.
pub async fn follow(controller: &WorkflowController, mode: UiMode, verbose: bool) -> ExitCode {
    let mut rx = controller.subscribe();
    let mut ui = WorkflowUI::new(mode, verbose);

    let initial = rx.borrow_and_update().clone();
    if let Some(workflow) = &initial.workflow {
        ui.print_header(workflow);
    }
    ui.render(&initial);

    let mut interrupted = false;
    if initial.live {
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = rx.borrow_and_update().clone();
                    ui.render(&view);
                    if !view.live {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    interrupted = true;
                    controller.teardown();
                    break;
                }
            }
        }
    }

    let last = controller.snapshot();
    ui.render(&last);
    ui.finish(&last);

    match last.workflow.map(|w| w.status) {
        Some(WorkflowStatus::Completed) => ExitCode::SUCCESS,
        Some(WorkflowStatus::Failed) => ExitCode::from(1),
        _ if interrupted => ExitCode::from(130),
        _ => ExitCode::SUCCESS,
    }
}
