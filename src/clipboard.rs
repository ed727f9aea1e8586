//! Clipboard sync: text pushed over HTTP lands on the local clipboard.

use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::ClipboardError;
use crate::notifications::NotificationSink;
use crate::types::truncate_for_display;

/// Characters of clipboard text shown in the confirmation notice.
pub const NOTICE_PREVIEW_CHARS: usize = 200;

/// Writes text to a clipboard.
pub trait ClipboardWriter: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The OS clipboard.
///
/// The handle is opened on first use and kept, since some platforms drop the
/// contents when the owning handle goes away.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

impl ClipboardWriter for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            *guard = Some(clipboard);
        }

        let result = match guard.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text.to_owned())
                .map_err(|e| ClipboardError::Unavailable(e.to_string())),
            None => Err(ClipboardError::Unavailable("clipboard not open".into())),
        };

        // Reopen next time; the handle may be stale.
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

/// Applies received text to the clipboard off the request path and reports
/// the outcome as a notification.
#[derive(Clone)]
pub struct ClipboardSync {
    writer: Arc<dyn ClipboardWriter>,
    sink: Arc<dyn NotificationSink>,
    runtime: Handle,
}

impl ClipboardSync {
    /// Must be called from within a Tokio runtime.
    pub fn new(writer: Arc<dyn ClipboardWriter>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            writer,
            sink,
            runtime: Handle::current(),
        }
    }

    /// Schedule `text` for the clipboard. Returns before the write happens.
    pub fn sync(&self, text: String) -> Result<(), ClipboardError> {
        if text.is_empty() {
            return Err(ClipboardError::Empty);
        }

        let writer = Arc::clone(&self.writer);
        let sink = Arc::clone(&self.sink);
        self.runtime.spawn_blocking(move || match writer.set_text(&text) {
            Ok(()) => {
                info!(chars = text.chars().count(), "Clipboard updated");
                sink.show_transient(
                    "Clipboard synced",
                    &truncate_for_display(&text, NOTICE_PREVIEW_CHARS),
                );
            }
            Err(e) => {
                warn!(error = %e, "Clipboard update failed");
                sink.show_transient("Clipboard sync failed", &e.to_string());
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{CancellablePrompt, PromptHandle};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct MemoryClipboard {
        contents: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ClipboardWriter for MemoryClipboard {
        fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
            if self.fail {
                return Err(ClipboardError::Unavailable("locked by another process".into()));
            }
            self.contents.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<(String, String)>>);

    impl NotificationSink for Notices {
        fn show_cancellable(&self, _prompt: CancellablePrompt) -> PromptHandle {
            PromptHandle(0)
        }

        fn show_transient(&self, title: &str, body: &str) {
            self.0
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }

        fn dismiss(&self, _handle: PromptHandle) {}
    }

    async fn wait_for_notice(notices: &Notices) -> (String, String) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(n) = notices.0.lock().unwrap().first().cloned() {
                return n;
            }
            assert!(Instant::now() < deadline, "no notice shown");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_sync_writes_and_notifies() {
        let clipboard = Arc::new(MemoryClipboard::default());
        let notices = Arc::new(Notices::default());
        let sync = ClipboardSync::new(clipboard.clone(), notices.clone());

        sync.sync("hello from the phone".into()).unwrap();

        let (title, body) = wait_for_notice(&notices).await;
        assert_eq!(title, "Clipboard synced");
        assert_eq!(body, "hello from the phone");
        assert_eq!(*clipboard.contents.lock().unwrap(), vec!["hello from the phone"]);
    }

    #[tokio::test]
    async fn test_long_text_is_truncated_in_notice_only() {
        let clipboard = Arc::new(MemoryClipboard::default());
        let notices = Arc::new(Notices::default());
        let sync = ClipboardSync::new(clipboard.clone(), notices.clone());

        let text = "x".repeat(500);
        sync.sync(text.clone()).unwrap();

        let (_, body) = wait_for_notice(&notices).await;
        assert_eq!(body.chars().count(), NOTICE_PREVIEW_CHARS);
        assert!(body.ends_with("..."));
        assert_eq!(clipboard.contents.lock().unwrap()[0], text);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let notices = Arc::new(Notices::default());
        let sync = ClipboardSync::new(Arc::new(MemoryClipboard::default()), notices.clone());
        assert!(matches!(sync.sync(String::new()), Err(ClipboardError::Empty)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(notices.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let clipboard = Arc::new(MemoryClipboard {
            fail: true,
            ..Default::default()
        });
        let notices = Arc::new(Notices::default());
        let sync = ClipboardSync::new(clipboard, notices.clone());

        sync.sync("text".into()).unwrap();

        let (title, body) = wait_for_notice(&notices).await;
        assert_eq!(title, "Clipboard sync failed");
        assert!(body.contains("locked by another process"));
    }
}
