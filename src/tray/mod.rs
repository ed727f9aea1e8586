//! System tray icon for Windows.
//!
//! The tray owns the main thread's event loop for as long as the app runs
//! with a UI. Exit from the menu or `stop` ends it.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::Coordinator;

#[cfg(windows)]
mod windows;

/// What the tray menu acts on.
pub struct TrayContext {
    pub coordinator: Coordinator,
    pub config: Config,
    /// Set by the tray on Exit, or by others to close the tray.
    pub stop: Arc<AtomicBool>,
}

impl TrayContext {
    /// Local URL of the HTTP control surface.
    pub fn control_url(&self) -> String {
        let host = match self.config.server.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}/", host, self.config.server.port)
    }
}

#[cfg(windows)]
pub use windows::run_tray;

#[cfg(not(windows))]
pub fn run_tray(_ctx: TrayContext) -> anyhow::Result<()> {
    anyhow::bail!("System tray is only supported on Windows")
}
