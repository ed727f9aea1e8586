//! Error types for the Bealink server.

use thiserror::Error;

/// Errors that reach the run command.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("Cancel listener '{source_name}' failed to start: {reason}")]
    ListenerStart {
        source_name: &'static str,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard text is empty")]
    Empty,

    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid discovery config: {0}")]
    Config(String),

    #[error("No usable network address found")]
    NoAddress,

    #[error("mDNS error: {0}")]
    Mdns(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discover() -> AppResult<()> {
        let failed: Result<(), DiscoveryError> = Err(DiscoveryError::NoAddress);
        failed?;
        Ok(())
    }

    #[test]
    fn test_library_errors_convert() {
        let err = discover().unwrap_err();
        assert!(matches!(err, AppError::Discovery(DiscoveryError::NoAddress)));
        assert_eq!(
            err.to_string(),
            "Discovery error: No usable network address found"
        );

        let err = AppError::from(ConfigError::Invalid("port must be non-zero".into()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid config: port must be non-zero"
        );
    }

    #[test]
    fn test_bind_error_names_address() {
        let err = AppError::Bind {
            address: "0.0.0.0:8081".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to listen on 0.0.0.0:8081"));
    }
}
