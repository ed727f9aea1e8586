//! Cancel a pending action on any keystroke.

use std::sync::Arc;
use tracing::debug;

use crate::config::ActionsConfig;
use crate::coordinator::CancelSource;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::KeyboardHook;

/// Cancellation sources enabled by the configuration.
///
/// The countdown prompt's click handler is not listed here; the notification
/// sink owns it.
pub fn cancel_sources(config: &ActionsConfig) -> Vec<Arc<dyn CancelSource>> {
    if !config.keyboard_cancel {
        debug!("Keyboard cancel disabled");
        return Vec::new();
    }

    #[cfg(windows)]
    {
        vec![Arc::new(KeyboardHook) as Arc<dyn CancelSource>]
    }

    #[cfg(not(windows))]
    {
        debug!("Keyboard cancel is only available on Windows");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_keyboard_cancel_has_no_sources() {
        let config = ActionsConfig {
            keyboard_cancel: false,
            ..Default::default()
        };
        assert!(cancel_sources(&config).is_empty());
    }

    #[cfg(windows)]
    #[test]
    fn test_windows_has_keyboard_source() {
        let sources = cancel_sources(&ActionsConfig::default());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "keyboard");
    }
}
