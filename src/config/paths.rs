//! Path utilities for the Bealink server.
//!
//! Defines standard locations for configuration and logs.

use std::path::PathBuf;

/// Base data directory for the server.
///
/// On Windows: `%APPDATA%\Bealink\Server\data`
/// On other platforms: `~/.local/share/bealink-server`
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("app", "Bealink", "Server")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".bealink")
        })
}

/// Default configuration file path.
pub fn config_file() -> PathBuf {
    data_dir().join("config.toml")
}

/// Log directory, created on demand.
pub fn log_dir() -> std::io::Result<PathBuf> {
    let path = data_dir().join("logs");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}
