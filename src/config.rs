//! Layered configuration for conductor.
//!
//! Settings are read from `.conductor/config.toml` in the project directory,
//! falling back to `<config dir>/conductor/config.toml`, then overridden by
//! environment variables and finally by CLI flags.
//!
//! ```toml
//! [backend]
//! api_url = "http://localhost:8001"
//! ws_url = "ws://localhost:8001"
//! api_key = "..."
//! timeout_secs = 30
//! push = true
//!
//! [sync]
//! poll_interval_ms = 2000
//! reconnect_delay_ms = 5000
//! reconnect_budget = 3
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::BackendSettings;
use crate::source::SyncSettings;

pub const CONFIG_DIR: &str = ".conductor";
pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_API_URL: &str = "CONDUCTOR_API_URL";
pub const ENV_WS_URL: &str = "CONDUCTOR_WS_URL";
pub const ENV_API_KEY: &str = "CONDUCTOR_API_KEY";
pub const ENV_API_TOKEN: &str = "CONDUCTOR_API_TOKEN";

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// Base URL of the orchestration backend's HTTP API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL for the push channel; derived from `api_url` when absent
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Sent as `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sent as a bearer token
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Try the WebSocket channel before falling back to polling
    #[serde(default = "default_push")]
    pub push: bool,
}

fn default_api_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_push() -> bool {
    true
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            api_key: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
            push: default_push(),
        }
    }
}

/// `[sync]` section: timings of the status source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_budget")]
    pub reconnect_budget: u32,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_budget() -> u32 {
    3
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_budget: default_reconnect_budget(),
        }
    }
}

/// The complete config.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub sync: SyncSection,
}

impl ConductorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Save configuration to a TOML file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.backend.api_url = url;
        }
        if let Some(url) = non_empty(ENV_WS_URL) {
            self.backend.ws_url = Some(url);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.backend.api_key = Some(key);
        }
        if let Some(token) = non_empty(ENV_API_TOKEN) {
            self.backend.api_token = Some(token);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !is_http_url(&self.backend.api_url) {
            warnings.push(format!(
                "Invalid api_url '{}': should start with http:// or https://",
                self.backend.api_url
            ));
        }
        if let Some(ws) = &self.backend.ws_url
            && !(ws.starts_with("ws://") || ws.starts_with("wss://"))
        {
            warnings.push(format!(
                "Invalid ws_url '{}': should start with ws:// or wss://",
                ws
            ));
        }
        if self.backend.timeout_secs == 0 {
            warnings.push("timeout_secs is 0; every request would time out".to_string());
        }
        if self.sync.poll_interval_ms < 100 {
            warnings.push(format!(
                "poll_interval_ms = {} is very aggressive; consider at least 500",
                self.sync.poll_interval_ms
            ));
        }
        if self.sync.reconnect_budget == 0 {
            warnings.push(
                "reconnect_budget = 0 disables push reconnects; \
                 lost connections fall back to polling immediately"
                    .to_string(),
            );
        }

        warnings
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            api_url: self.backend.api_url.trim_end_matches('/').to_string(),
            ws_url: self
                .backend
                .ws_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: self.backend.api_key.clone(),
            api_token: self.backend.api_token.clone(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
            push: self.backend.push,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
            reconnect_delay: Duration::from_millis(self.sync.reconnect_delay_ms),
            reconnect_budget: self.sync.reconnect_budget,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Project-local config path (may not exist).
pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// First existing config file: project-local, then per-user.
pub fn find_config_file(project_dir: &Path) -> Option<PathBuf> {
    let local = project_config_path(project_dir);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("conductor").join(CONFIG_FILE))
        .filter(|p| p.exists())
}

/// Values supplied on the command line; `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub api_key: Option<String>,
    pub no_push: bool,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub file: ConductorToml,
    /// Config file that was loaded, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Resolve file → environment → CLI.
    pub fn resolve(project_dir: &Path, overrides: &CliOverrides) -> Result<Self> {
        let source = find_config_file(project_dir);
        let mut file = match &source {
            Some(path) => ConductorToml::load(path)?,
            None => ConductorToml::default(),
        };
        file.apply_env(|key| std::env::var(key).ok());
        Self::apply_overrides(&mut file, overrides);
        tracing::debug!(
            source = ?source,
            api_url = %file.backend.api_url,
            "configuration resolved"
        );
        Ok(Self { file, source })
    }

    fn apply_overrides(file: &mut ConductorToml, overrides: &CliOverrides) {
        if let Some(url) = &overrides.api_url {
            file.backend.api_url = url.clone();
        }
        if let Some(url) = &overrides.ws_url {
            file.backend.ws_url = Some(url.clone());
        }
        if let Some(key) = &overrides.api_key {
            file.backend.api_key = Some(key.clone());
        }
        if overrides.no_push {
            file.backend.push = false;
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        self.file.backend_settings()
    }

    pub fn sync_settings(&self) -> SyncSettings {
        self.file.sync_settings()
    }
}
