//! Config command - configuration utilities.

use anyhow::Result;
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::Config;

/// Run the config command.
pub fn run(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Validate => validate_config(config_path),
        ConfigAction::Show => show_config(config_path),
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn validate_config(config_path: &Path) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!("Path: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("No configuration file found; built-in defaults will be used.");
        println!();
        println!("To customise, create a file at:");
        println!("  {}", config_path.display());
        println!();
        return Ok(());
    }

    match Config::load_from(config_path) {
        Ok(config) => {
            println!("Configuration is valid.");
            println!();
            println!("Summary:");
            println!("  Listen address: {}", config.bind_address());
            println!(
                "  Grace period: {}s",
                config.actions.grace_period_seconds
            );
            println!(
                "  Keyboard cancel: {}",
                if config.actions.keyboard_cancel { "on" } else { "off" }
            );
            if config.actions.dry_run {
                println!("  Dry run: power commands are logged only");
            }
            if config.discovery.enabled {
                println!(
                    "  mDNS: {}.{}",
                    config.discovery.instance_name(),
                    config.discovery.service_type
                );
            } else {
                println!("  mDNS: disabled");
            }
        }
        Err(e) => {
            println!("ERROR: Configuration is invalid");
            println!();
            println!("Details: {}", e);
            println!();
            println!("Fix the configuration and run 'bealink config validate' again.");
            println!();
            anyhow::bail!("invalid configuration");
        }
    }

    println!();
    Ok(())
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    if !config_path.exists() {
        println!("# {} not found, showing defaults", config_path.display());
    } else {
        println!("# {}", config_path.display());
    }
    println!("{}", config.to_toml()?);
    Ok(())
}
