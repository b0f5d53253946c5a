//! Print one workflow's recorded state: `conductor show <id>`.

use anyhow::{Result, bail};

use conductor::history::HistoryStore;
use conductor::ui::{UiMode, print_workflow};

use super::Session;

pub async fn cmd_show(session: &Session, id: &str) -> Result<()> {
    let mut history = HistoryStore::new(session.backend.clone());
    history.refresh().await?;
    let Some(summary) = history.find(id) else {
        bail!("Workflow '{}' not found in history", id);
    };
    let workflow = summary.clone().into_workflow();

    if session.output == UiMode::Json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
    } else {
        print_workflow(&workflow);
    }
    Ok(())
}
