//! Bealink server
//!
//! Tray-resident remote control for a Windows PC: power off and sleep with a
//! cancellable grace period, clipboard sync over HTTP, and mDNS discovery for
//! the mobile client.

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod clipboard;
mod config;
mod coordinator;
mod crash;
mod discovery;
mod error;
mod executor;
mod keyboard;
mod notifications;
mod server;
mod tray;
mod types;

use cli::{Cli, Command};
use types::APP_NAME;

fn main() {
    // Errors before logging is up would otherwise vanish with no console
    if let Err(e) = real_main() {
        show_startup_error(&format!("{:?}", e));
        std::process::exit(1);
    }
}

#[cfg(windows)]
fn show_startup_error(message: &str) {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        MessageBoxW, MB_ICONERROR, MB_SETFOREGROUND, MB_TOPMOST,
    };

    let title = format!("{APP_NAME} - Startup Error");
    let full_message = format!(
        "Failed to start {APP_NAME}:\n\n{}\n\nRun 'bealink config validate' to check the configuration.",
        message
    );

    let title_wide: Vec<u16> = OsStr::new(&title).encode_wide().chain(Some(0)).collect();
    let message_wide: Vec<u16> = OsStr::new(&full_message)
        .encode_wide()
        .chain(Some(0))
        .collect();

    unsafe {
        MessageBoxW(
            0,
            message_wide.as_ptr(),
            title_wide.as_ptr(),
            MB_ICONERROR | MB_SETFOREGROUND | MB_TOPMOST,
        );
    }
}

#[cfg(not(windows))]
fn show_startup_error(message: &str) {
    eprintln!("{APP_NAME} startup error: {}", message);
}

#[tokio::main]
async fn real_main() -> Result<()> {
    crash::install_panic_hook();

    let cli = Cli::parse();

    // The tray build has no use for a console window
    #[cfg(windows)]
    if matches!(cli.command, Command::Run { headless: false }) {
        unsafe {
            windows_sys::Win32::System::Console::FreeConsole();
        }
    }

    // Run logs to daily files; one-shot commands log to the console
    let _guard = match &cli.command {
        Command::Run { .. } => init_file_logging(&cli)?,
        _ => init_console_logging(&cli)?,
    };

    info!(version = env!("CARGO_PKG_VERSION"), "{APP_NAME} starting");

    let config_path = cli.config_file();
    match cli.command {
        Command::Run { headless } => cli::run::run(&config_path, headless).await,
        Command::Config { action } => cli::config::run(action, &config_path),
        Command::Version => {
            println!("bealink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_console_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    Ok(None)
}

fn init_file_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config::paths::log_dir()?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("bealink")
        .filename_suffix("log")
        .max_log_files(10)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    Ok(Some(guard))
}
