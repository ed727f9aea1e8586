//! Desktop notifications.
//!
//! The coordinator talks to a [`NotificationSink`]; implementations must
//! return immediately. On Windows the sink queues work to a dedicated GUI
//! thread that owns every notification window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::NotificationsConfig;
use crate::coordinator::Trigger;
use crate::types::ActionKind;

#[cfg(windows)]
mod windows;

/// Placeholder replaced by the remaining whole seconds in a prompt body.
pub const SECS_PLACEHOLDER: &str = "{secs}";

/// Identifies a cancellable prompt so it can be dismissed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptHandle(pub u64);

/// Countdown prompt for a pending action. Clicking it fires `on_click`.
#[derive(Clone)]
pub struct CancellablePrompt {
    pub kind: ActionKind,
    pub title: String,
    pub body_template: String,
    pub deadline: Instant,
    pub grace: Duration,
    pub on_click: Trigger,
}

impl CancellablePrompt {
    /// Body text for the given moment.
    pub fn render_body(&self, now: Instant) -> String {
        let remaining = self.deadline.saturating_duration_since(now);
        // Round to the nearest second so the first frame shows the full grace period.
        let secs = (remaining.as_millis() + 500) / 1000;
        if secs > 0 {
            self.body_template
                .replace(SECS_PLACEHOLDER, &secs.to_string())
        } else {
            format!("Executing {}...", self.kind)
        }
    }

    /// Elapsed fraction of the grace period, in `0.0..=1.0`.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.grace.is_zero() {
            return 1.0;
        }
        let remaining = self.deadline.saturating_duration_since(now);
        let elapsed = self.grace.saturating_sub(remaining);
        (elapsed.as_secs_f32() / self.grace.as_secs_f32()).clamp(0.0, 1.0)
    }
}

impl std::fmt::Debug for CancellablePrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellablePrompt")
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Displays prompts and notices. Every method must return without blocking.
pub trait NotificationSink: Send + Sync {
    fn show_cancellable(&self, prompt: CancellablePrompt) -> PromptHandle;
    fn show_transient(&self, title: &str, body: &str);
    fn dismiss(&self, handle: PromptHandle);
}

/// Sink that only logs; used when notifications are disabled or unsupported.
#[derive(Default)]
pub struct LogNotifier {
    next_id: AtomicU64,
}

impl NotificationSink for LogNotifier {
    fn show_cancellable(&self, prompt: CancellablePrompt) -> PromptHandle {
        let handle = PromptHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            prompt = handle.0,
            title = %prompt.title,
            body = %prompt.render_body(Instant::now()),
            "Countdown prompt"
        );
        handle
    }

    fn show_transient(&self, title: &str, body: &str) {
        info!(title, body, "Notification");
    }

    fn dismiss(&self, handle: PromptHandle) {
        debug!(prompt = handle.0, "Countdown prompt dismissed");
    }
}

/// Owns the active sink and whatever thread backs it.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    #[cfg(windows)]
    desktop: Option<Arc<windows::DesktopNotifier>>,
}

impl Notifier {
    /// Start the notifier described by the config.
    pub fn start(config: &NotificationsConfig) -> Self {
        if !config.enabled {
            info!("Desktop notifications disabled, logging only");
            return Self::log_only();
        }

        #[cfg(windows)]
        {
            match windows::DesktopNotifier::start() {
                Ok(desktop) => {
                    let desktop = Arc::new(desktop);
                    return Self {
                        sink: desktop.clone(),
                        desktop: Some(desktop),
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to start notification thread, logging only");
                }
            }
        }

        #[cfg(not(windows))]
        debug!("Desktop notifications not supported on this platform, logging only");

        Self::log_only()
    }

    fn log_only() -> Self {
        Self {
            sink: Arc::new(LogNotifier::default()),
            #[cfg(windows)]
            desktop: None,
        }
    }

    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        Arc::clone(&self.sink)
    }

    /// Close all notification windows and join the GUI thread.
    pub fn stop(&self) {
        #[cfg(windows)]
        if let Some(desktop) = &self.desktop {
            desktop.stop();
        }
    }
}
