use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use conductor_common::{LogEntry, Workflow, WorkflowStatus};

use crate::controller::WorkflowView;
use crate::ui::icons::{CHECK, CROSS, LINK, SPARKLE, WARNING, status_icon};

/// Output mode for workflow rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bar with the log streaming above it
    #[default]
    Full,
    /// One plain line per change, for pipes and CI logs
    Plain,
    /// One JSON object per change
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "plain" | "minimal" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output mode '{}' (full, plain, json)", other)),
        }
    }
}

impl UiMode {
    /// `Full` only when stdout is a terminal.
    pub fn detect(requested: Option<UiMode>) -> Self {
        match requested {
            Some(mode) => mode,
            None if Term::stdout().is_term() => Self::Full,
            None => Self::Plain,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent<'a> {
    Log {
        workflow_id: &'a str,
        #[serde(flatten)]
        entry: &'a LogEntry,
    },
    State {
        workflow_id: &'a str,
        status: WorkflowStatus,
        progress: u8,
        live: bool,
        transport_degraded: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a str>,
    },
}

/// Terminal renderer for one workflow's view.
///
/// Fed every snapshot the controller publishes; prints only what changed since
/// the previous snapshot: new log entries, status or progress movement, and the
/// degraded banner as it appears or clears.
pub struct WorkflowUI {
    mode: UiMode,
    multi: MultiProgress,
    bar: ProgressBar,
    term: Term,
    verbose: bool,
    shown_lines: usize,
    last_state: Option<(WorkflowStatus, u8)>,
    degraded: bool,
}

impl WorkflowUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let bar = if mode == UiMode::Full {
            let style = ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .expect("progress bar template is a valid static string")
                .progress_chars("█▓▒░");
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(250));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            mode,
            multi,
            bar,
            term: Term::stdout(),
            verbose,
            shown_lines: 0,
            last_state: None,
            degraded: false,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        match self.mode {
            UiMode::Full => {
                if self.multi.println(msg.as_ref()).is_err() {
                    eprintln!("{}", msg.as_ref());
                }
            }
            _ => {
                let _ = writeln!(&self.term, "{}", msg.as_ref());
            }
        }
    }

    fn print_json(&self, event: &JsonEvent<'_>) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    /// Header printed once before the first snapshot.
    pub fn print_header(&self, workflow: &Workflow) {
        if self.mode == UiMode::Json {
            return;
        }
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {} {}",
            style("▶").green().bold(),
            style(workflow.repo_name()).yellow().bold(),
            style(format!("({})", workflow.id)).dim()
        ));
        self.print_line(format!(
            "{}  {}",
            style("Mode:").dim(),
            workflow.mode
        ));
        if let Some(prompt) = &workflow.prompt {
            self.print_line(format!("{}  {}", style("Prompt:").dim(), prompt));
        }
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line("");
        self.bar.set_prefix(workflow.repo_name());
    }

    /// Render whatever changed since the previous call.
    pub fn render(&mut self, view: &WorkflowView) {
        let Some(workflow) = view.workflow.as_ref() else {
            return;
        };

        // A different workflow restarts the log cursor.
        if self.shown_lines > workflow.log.len() {
            self.shown_lines = 0;
        }
        for entry in &workflow.log[self.shown_lines..] {
            match self.mode {
                UiMode::Json => self.print_json(&JsonEvent::Log {
                    workflow_id: &workflow.id,
                    entry,
                }),
                _ => self.print_line(format!(
                    "  {} {}",
                    style(entry.at.format("[%H:%M:%S]")).dim(),
                    entry.line
                )),
            }
        }
        self.shown_lines = workflow.log.len();

        if view.transport_degraded != self.degraded {
            self.degraded = view.transport_degraded;
            self.show_degraded(view);
        }

        let state = (workflow.status, workflow.progress);
        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.show_state(workflow, view);
        }
    }

    fn show_degraded(&self, view: &WorkflowView) {
        match self.mode {
            UiMode::Json => {}
            _ if self.degraded => {
                let reason = view.degraded_reason.as_deref().unwrap_or("backend unreachable");
                let banner = format!(
                    "Live updates interrupted: {} (showing last known state)",
                    reason
                );
                self.print_line(format!("  {} {}", WARNING, style(banner).yellow().bold()));
            }
            _ => self.print_line(format!("  {} {}", LINK, style("Live updates restored").green())),
        }
    }

    fn show_state(&self, workflow: &Workflow, view: &WorkflowView) {
        match self.mode {
            UiMode::Full => {
                self.bar.set_position(u64::from(workflow.progress));
                self.bar.set_message(format!(
                    "{}{}",
                    status_icon(workflow.status),
                    style(workflow.status).cyan()
                ));
            }
            UiMode::Plain => {
                if self.verbose || workflow.status != WorkflowStatus::Pending {
                    self.print_line(format!(
                        "  {}{} {}%",
                        status_icon(workflow.status),
                        workflow.status,
                        workflow.progress
                    ));
                }
            }
            UiMode::Json => self.print_json(&JsonEvent::State {
                workflow_id: &workflow.id,
                status: workflow.status,
                progress: workflow.progress,
                live: view.live,
                transport_degraded: view.transport_degraded,
                error: workflow.error.as_deref(),
            }),
        }
    }

    /// Stop the bar and print the outcome line.
    pub fn finish(&self, view: &WorkflowView) {
        let Some(workflow) = view.workflow.as_ref() else {
            self.bar.finish_and_clear();
            return;
        };
        let line = match workflow.status {
            WorkflowStatus::Completed => format!(
                "{} Workflow {} completed {}",
                CHECK,
                style(&workflow.id).green().bold(),
                SPARKLE
            ),
            WorkflowStatus::Failed => format!(
                "{} Workflow {} failed: {}",
                CROSS,
                style(&workflow.id).red().bold(),
                workflow.error.as_deref().unwrap_or("no error reported")
            ),
            status => format!(
                "{} Stopped following {} while {} ({}%)",
                status_icon(status),
                style(&workflow.id).yellow(),
                status,
                workflow.progress
            ),
        };
        match self.mode {
            UiMode::Full => {
                self.bar.finish_with_message(format!(
                    "{}{}",
                    status_icon(workflow.status),
                    workflow.status
                ));
                self.print_line(format!("\n{}\n", line));
            }
            UiMode::Plain => self.print_line(line),
            UiMode::Json => {}
        }
    }
}

/// Static, non-live rendering of a workflow (used by `show`).
pub fn print_workflow(workflow: &Workflow) {
    let term = Term::stdout();
    let _ = writeln!(
        &term,
        "{} {} {}",
        status_icon(workflow.status),
        style(workflow.repo_name()).bold(),
        style(format!("({})", workflow.id)).dim()
    );
    let _ = writeln!(&term, "  {:<10} {}", style("Status").dim(), workflow.status);
    let _ = writeln!(&term, "  {:<10} {}%", style("Progress").dim(), workflow.progress);
    let _ = writeln!(&term, "  {:<10} {}", style("Mode").dim(), workflow.mode);
    let _ = writeln!(&term, "  {:<10} {}", style("Source").dim(), workflow.source_url);
    if let Some(prompt) = &workflow.prompt {
        let _ = writeln!(&term, "  {:<10} {}", style("Prompt").dim(), prompt);
    }
    let _ = writeln!(
        &term,
        "  {:<10} {}",
        style("Created").dim(),
        workflow.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(error) = &workflow.error {
        let _ = writeln!(&term, "  {:<10} {}", style("Error").dim(), style(error).red());
    }
    if !workflow.log.is_empty() {
        let _ = writeln!(&term);
        for entry in &workflow.log {
            let _ = writeln!(&term, "  {}", entry);
        }
    }
}
