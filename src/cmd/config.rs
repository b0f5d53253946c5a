//! Configuration view and validation commands: `conductor config`.

use anyhow::Result;
use std::path::Path;

use conductor::config::{CliOverrides, Config, ConductorToml, find_config_file, project_config_path};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(cli, project_dir),
        Some(ConfigCommands::Validate) => validate(project_dir),
        Some(ConfigCommands::Init { force }) => init(project_dir, force),
    }
}

fn show(cli: &Cli, project_dir: &Path) -> Result<()> {
    println!();
    println!("Conductor Configuration");
    println!("=======================");
    println!();

    match find_config_file(project_dir) {
        Some(path) => println!("Config file: {}", path.display()),
        None => {
            println!("No config.toml found; using defaults.");
            println!("Run 'conductor config init' to create one.");
        }
    }
    println!();

    let overrides = CliOverrides {
        api_url: cli.api_url.clone(),
        ws_url: cli.ws_url.clone(),
        api_key: cli.api_key.clone(),
        no_push: cli.no_push,
    };
    let config = Config::resolve(project_dir, &overrides)?;
    let backend = config.backend_settings();
    let sync = &config.file.sync;

    println!("Effective values (with env/CLI overrides):");
    println!("[backend]");
    println!("  api_url = \"{}\"", backend.api_url);
    println!("  ws_url = \"{}\"", backend.stream_base());
    println!("  api_key = {}", mask(backend.api_key.as_deref()));
    println!("  api_token = {}", mask(backend.api_token.as_deref()));
    println!("  timeout_secs = {}", backend.timeout.as_secs());
    println!("  push = {}", backend.push);
    println!();
    println!("[sync]");
    println!("  poll_interval_ms = {}", sync.poll_interval_ms);
    println!("  reconnect_delay_ms = {}", sync.reconnect_delay_ms);
    println!("  reconnect_budget = {}", sync.reconnect_budget);
    println!();
    Ok(())
}

fn validate(project_dir: &Path) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!();

    let Some(path) = find_config_file(project_dir) else {
        println!("No config.toml found. Using defaults (valid).");
        return Ok(());
    };

    let toml = ConductorToml::load(&path)?;
    let warnings = toml.validate();
    if warnings.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("Configuration warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    println!();
    Ok(())
}

fn init(project_dir: &Path, force: bool) -> Result<()> {
    let path = project_config_path(project_dir);
    if path.exists() && !force {
        println!("config.toml already exists at {}", path.display());
        println!("Pass --force to overwrite it.");
        return Ok(());
    }

    ConductorToml::default().save(&path)?;

    println!("Created config.toml at {}", path.display());
    println!();
    println!("You can now customize:");
    println!("  - [backend] api_url, ws_url, api_key, timeout_secs, push");
    println!("  - [sync] poll_interval_ms, reconnect_delay_ms, reconnect_budget");
    println!();
    Ok(())
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        None => "(unset)".to_string(),
        Some(s) if s.chars().count() <= 4 => "\"****\"".to_string(),
        Some(s) => {
            let skip = s.chars().count() - 4;
            let tail: String = s.chars().skip(skip).collect();
            format!("\"****{}\"", tail)
        }
    }
}
