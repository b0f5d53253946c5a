//! Backend health probe: `conductor health`.

use anyhow::Result;
use console::style;
use std::process::ExitCode;

use conductor::ui::UiMode;
use conductor::ui::icons::{CHECK, CROSS, WARNING};

use super::Session;

pub async fn cmd_health(session: &Session) -> Result<ExitCode> {
    let api_url = session.config.backend_settings().api_url;
    let report = session.backend.health().await?;

    if session.output == UiMode::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let icon = if report.is_healthy() { CHECK } else { CROSS };
        println!();
        println!(
            "{}{} {}",
            icon,
            style(&api_url).bold(),
            style(&report.status).cyan()
        );
        if let Some(service) = &report.service {
            let version = report.version.as_deref().unwrap_or("unknown version");
            println!("  {} {}", service, style(version).dim());
        }
        for (name, check) in &report.checks {
            let healthy = check.status.eq_ignore_ascii_case("healthy")
                || check.status.eq_ignore_ascii_case("ok");
            let detail = check
                .error
                .as_deref()
                .or(check.message.as_deref())
                .unwrap_or("");
            println!(
                "  {}{:<12} {} {}",
                if healthy { CHECK } else { WARNING },
                name,
                check.status,
                style(detail).dim()
            );
        }
        println!();
    }

    Ok(if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
