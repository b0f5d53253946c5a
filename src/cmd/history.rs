//! List past workflows: `conductor history`.

use anyhow::Result;
use chrono::Local;
use console::style;

use conductor::history::HistoryStore;
use conductor::ui::UiMode;
use conductor::ui::icons::status_icon;
use conductor_common::{WorkflowStatus, WorkflowSummary};

use super::Session;

pub async fn cmd_history(
    session: &Session,
    limit: usize,
    status: Option<WorkflowStatus>,
) -> Result<()> {
    let mut history = HistoryStore::new(session.backend.clone());
    history.refresh().await?;
    let entries: Vec<&WorkflowSummary> = history
        .entries()
        .iter()
        .filter(|e| status.is_none_or(|s| e.status == s))
        .take(limit)
        .collect();

    if session.output == UiMode::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No workflows found.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<38} {:<12} {:>5}  {:<32} {}",
        style("ID").bold(),
        style("STATUS").bold(),
        style("PROG").bold(),
        style("REPOSITORY").bold(),
        style("CREATED").bold()
    );
    for entry in &entries {
        let progress = match entry.status {
            WorkflowStatus::Completed => 100,
            _ => entry.progress.unwrap_or(0),
        };
        println!(
            "  {:<38} {}{:<10} {:>4}%  {:<32} {}",
            entry.id,
            status_icon(entry.status),
            entry.status,
            progress,
            truncate(&entry.repo_name(), 32),
            style(entry.created_at.format("%Y-%m-%d %H:%M")).dim()
        );
    }
    println!();
    let refreshed = history
        .last_refreshed()
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "  {} of {} shown {}",
        entries.len(),
        history.entries().len(),
        style(format!("(refreshed {})", refreshed)).dim()
    );
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
