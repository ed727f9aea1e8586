//! Cancellation input sources.

use std::sync::Arc;

use crate::error::ActionError;

/// Callback a source fires to cancel the request it was started for.
pub type Trigger = Arc<dyn Fn() + Send + Sync>;

/// Something that can cancel a pending action asynchronously, such as a
/// global keystroke hook.
///
/// One listener is started per pending request and stopped on cancel,
/// supersession and expiry.
pub trait CancelSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn start(&self, trigger: Trigger) -> Result<Box<dyn StopHandle>, ActionError>;
}

/// Stops a running listener.
pub trait StopHandle: Send {
    /// Tear the listener down. Returns only once nothing of it is left running.
    fn stop(self: Box<Self>);
}
