//! Context retrieval preview: `conductor context search|config`.

use anyhow::{Context as _, Result};
use console::style;

use conductor::context::{
    ContextConfig, ContextMetrics, ContextQuery, PreviewFormat, format_for_agents, highlight,
    snippet,
};
use conductor::ui::UiMode;
use conductor::ui::icons::{FILE, SEARCH};

use super::Session;

const SNIPPET_CHARS: usize = 240;

pub async fn cmd_context_search(
    session: &Session,
    query: &str,
    limit: u32,
    format: PreviewFormat,
) -> Result<()> {
    let query = ContextQuery::new(query, limit)?;
    let results = session
        .backend
        .search_context(&query)
        .await
        .context("Context search failed")?;

    if session.output == UiMode::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if format == PreviewFormat::Markdown {
        print!("{}", format_for_agents(&query.query, &results));
        return Ok(());
    }

    println!();
    println!(
        "{} {} result(s) for \"{}\"",
        SEARCH,
        results.len(),
        style(&query.query).bold()
    );
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "  {}. {}{}  {}",
            rank + 1,
            FILE,
            style(&result.filename).cyan(),
            style(format!("{:.1}% match", result.similarity * 100.0)).dim()
        );
        let text = snippet(&result.content, SNIPPET_CHARS);
        let rendered: String = highlight(&text, &query.query)
            .into_iter()
            .map(|segment| {
                if segment.matched {
                    style(segment.text).yellow().bold().to_string()
                } else {
                    segment.text.to_string()
                }
            })
            .collect();
        println!("     {}", rendered);
        println!();
    }
    if let Some(metrics) = ContextMetrics::from_results(&results) {
        print_metrics(&metrics);
    }
    Ok(())
}

fn print_metrics(metrics: &ContextMetrics) {
    println!("{}", style("Context quality").bold());
    println!(
        "  average relevance  {:.1}%",
        metrics.average_relevance * 100.0
    );
    println!("  total characters   {}", metrics.total_chars);
    println!("  unique sources     {}", metrics.unique_sources);
    println!();
}

/// Changes requested on the command line; unset fields keep the backend's value.
#[derive(Debug, Default)]
pub struct ConfigChanges {
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
    pub similarity_threshold: Option<f64>,
    pub max_results: Option<u32>,
}

impl ConfigChanges {
    fn is_empty(&self) -> bool {
        self.chunk_size.is_none()
            && self.chunk_overlap.is_none()
            && self.similarity_threshold.is_none()
            && self.max_results.is_none()
    }

    fn apply(&self, config: &mut ContextConfig) {
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            config.chunk_overlap = v;
        }
        if let Some(v) = self.similarity_threshold {
            config.similarity_threshold = v;
        }
        if let Some(v) = self.max_results {
            config.max_results = v;
        }
    }
}

pub async fn cmd_context_config(session: &Session, changes: ConfigChanges) -> Result<()> {
    let mut config = session
        .backend
        .context_config()
        .await
        .context("Failed to read context configuration")?;

    if !changes.is_empty() {
        changes.apply(&mut config);
        config.validate()?;
        session
            .backend
            .update_context_config(&config)
            .await
            .context("Failed to update context configuration")?;
        tracing::info!(?config, "context configuration updated");
    }

    if session.output == UiMode::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!();
    println!("Context retrieval configuration");
    println!("===============================");
    println!("  chunk_size           = {}", config.chunk_size);
    println!("  chunk_overlap        = {}", config.chunk_overlap);
    println!("  similarity_threshold = {}", config.similarity_threshold);
    println!("  max_results          = {}", config.max_results);
    if !changes.is_empty() {
        println!();
        println!("{}", style("Saved.").green());
    }
    println!();
    Ok(())
}
