//! CLI command implementations.
//!
//! | Module    | Commands handled                 |
//! |-----------|----------------------------------|
//! | `submit`  | `Submit`                         |
//! | `watch`   | `Watch` (and the tail of submit) |
//! | `show`    | `Show`                           |
//! | `history` | `History`                        |
//! | `context` | `Context search`, `Context config` |
//! | `health`  | `Health`                         |
//! | `config`  | `Config`                         |

pub mod config;
pub mod context;
pub mod health;
pub mod history;
pub mod show;
pub mod submit;
pub mod watch;

pub use config::cmd_config;
pub use context::{cmd_context_config, cmd_context_search};
pub use health::cmd_health;
pub use history::cmd_history;
pub use show::cmd_show;
pub use submit::cmd_submit;
pub use watch::cmd_watch;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use conductor::backend::{Backend, HttpBackend};
use conductor::config::{CliOverrides, Config};
use conductor::source::SyncSettings;
use conductor::ui::UiMode;

use super::Cli;

/// Everything a backend-facing command needs.
pub struct Session {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub output: UiMode,
    pub verbose: bool,
}

impl Session {
    pub fn open(cli: &Cli, project_dir: &Path) -> Result<Self> {
        let overrides = CliOverrides {
            api_url: cli.api_url.clone(),
            ws_url: cli.ws_url.clone(),
            api_key: cli.api_key.clone(),
            no_push: cli.no_push,
        };
        let config = Config::resolve(project_dir, &overrides)?;
        for warning in config.file.validate() {
            tracing::warn!("{}", warning);
        }
        let backend = HttpBackend::new(config.backend_settings())
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            backend: Arc::new(backend),
            output: UiMode::detect(cli.output),
            verbose: cli.verbose,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        self.config.sync_settings()
    }
}
