//! Start a workflow: `conductor submit <url>`.

use anyhow::Result;
use console::style;
use std::process::ExitCode;

use conductor::controller::{SubmitRequest, WorkflowController};
use conductor::ui::UiMode;
use conductor_common::WorkflowMode;

use super::Session;
use super::watch::follow;

pub async fn cmd_submit(
    session: &Session,
    url: &str,
    prompt: Option<String>,
    mode: WorkflowMode,
    detach: bool,
) -> Result<ExitCode> {
    let controller = WorkflowController::new(session.backend.clone(), session.sync_settings());
    let request = SubmitRequest {
        source_url: url.to_string(),
        mode,
        prompt,
    };
    let workflow = controller.submit(request).await?;

    if session.output == UiMode::Json {
        if detach {
            println!("{}", serde_json::to_string(&workflow)?);
            return Ok(ExitCode::SUCCESS);
        }
    } else {
        println!(
            "{} Workflow {} started for {}",
            style("▶").green().bold(),
            style(&workflow.id).cyan().bold(),
            workflow.repo_name()
        );
    }

    if detach {
        controller.teardown();
        println!(
            "  Follow it with: {}",
            style(format!("conductor watch {}", workflow.id)).dim()
        );
        return Ok(ExitCode::SUCCESS);
    }

    Ok(follow(&controller, session.output, session.verbose).await)
}
