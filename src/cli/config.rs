//! Config command handlers.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use artifactd::config::validate::{validate_config, DiagnosticLevel};
use artifactd::config::Config;

use super::ConfigAction;

pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { path } => cmd_check(path),
        ConfigAction::Show => cmd_show(),
    }
}

/// Validate a configuration file. Fails when any error is found.
fn cmd_check(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(Config::path);
    println!("Config file: {}", config_path.display());

    if !config_path.exists() {
        println!("[OK] No config file found (using defaults)");
        return Ok(());
    }

    let content = std::fs::read_to_string(&config_path).context("Failed to read config file")?;

    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            println!("[ERROR] Invalid JSON: {}", e);
            bail!("Invalid configuration file");
        }
    };

    let diagnostics = validate_config(&raw);
    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    let warnings = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warn)
        .count();

    if errors == 0 && warnings == 0 {
        println!("\nConfiguration looks good!");
    } else {
        println!("\nFound {} error(s), {} warning(s)", errors, warnings);
    }
    if errors > 0 {
        bail!("Configuration has {} error(s)", errors);
    }
    Ok(())
}

/// Print the configuration after file loading and environment overrides.
fn cmd_show() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{}", json);
    Ok(())
}
