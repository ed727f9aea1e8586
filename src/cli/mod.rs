//! CLI command definitions and handlers.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::paths;

pub mod config;
pub mod run;

/// Bealink server - remote power and clipboard control for this PC.
#[derive(Parser, Debug)]
#[command(name = "bealink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level
    #[arg(long, default_value = "info", env = "BEALINK_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Path to config file
    #[arg(long, env = "BEALINK_CONFIG")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Config file to use: `--config-path` or the default location.
    pub fn config_file(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(paths::config_file)
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the server with its tray icon
    Run {
        /// No tray icon; stop with Ctrl+C
        #[arg(long)]
        headless: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate configuration file
    Validate,

    /// Show effective configuration
    Show,

    /// Show configuration file path
    Path,
}
