//! Delayed action coordinator.
//!
//! Holds at most one pending power action. A request arms a timer for the
//! grace period, shows a countdown prompt and starts the cancellation
//! listeners. Whichever of cancel, supersede or expiry takes the entry out of
//! the slot first wins; every other path finds its generation gone and does
//! nothing.
//!
//! Public operations only touch the slot under a short lock and return. Work
//! that may block (listener start/stop, the OS command) runs on Tokio's
//! blocking pool.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::notifications::{CancellablePrompt, NotificationSink, PromptHandle};
use crate::types::{ActionKind, CoordinatorStatus, APP_NAME};

mod source;

pub use source::{CancelSource, StopHandle, Trigger};

/// Cancellable delayed-action coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    grace: Duration,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn NotificationSink>,
    sources: Vec<Arc<dyn CancelSource>>,
    runtime: Handle,
    slot: Mutex<Slot>,
    /// Serializes listener teardown and startup so two global hooks never overlap.
    listeners: Mutex<()>,
}

#[derive(Default)]
struct Slot {
    next_generation: u64,
    pending: Option<PendingAction>,
    executing: Option<(u64, ActionKind)>,
    closed: bool,
}

struct PendingAction {
    generation: u64,
    kind: ActionKind,
    requested_at: DateTime<Utc>,
    deadline: Instant,
    timer: Option<JoinHandle<()>>,
    listeners: Vec<Box<dyn StopHandle>>,
    prompt: Option<PromptHandle>,
}

impl PendingAction {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn into_teardown(self) -> Teardown {
        Teardown {
            listeners: self.listeners,
            prompt: self.prompt,
        }
    }
}

/// Listeners and prompt left behind by a request that has left the slot.
#[derive(Default)]
struct Teardown {
    listeners: Vec<Box<dyn StopHandle>>,
    prompt: Option<PromptHandle>,
}

impl Coordinator {
    /// Create a coordinator. Must be called from within a Tokio runtime.
    pub fn new(
        grace: Duration,
        executor: Arc<dyn ActionExecutor>,
        sink: Arc<dyn NotificationSink>,
        sources: Vec<Arc<dyn CancelSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                grace,
                executor,
                sink,
                sources,
                runtime: Handle::current(),
                slot: Mutex::new(Slot::default()),
                listeners: Mutex::new(()),
            }),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.inner.grace
    }

    /// Schedule `kind` after the grace period, replacing any pending action
    /// without a cancellation notice. Returns immediately.
    pub fn request_action(&self, kind: ActionKind) {
        let deadline = Instant::now() + self.inner.grace;

        let (generation, superseded) = {
            let mut slot = self.inner.lock_slot();
            if slot.closed {
                warn!(action = %kind, "Coordinator is shut down, ignoring request");
                return;
            }

            slot.next_generation += 1;
            let generation = slot.next_generation;

            let superseded = slot.pending.take().map(|mut old| {
                old.abort_timer();
                info!(
                    generation = old.generation,
                    action = %old.kind,
                    "Pending action superseded"
                );
                old.into_teardown()
            });

            slot.pending = Some(PendingAction {
                generation,
                kind,
                requested_at: Utc::now(),
                deadline,
                timer: Some(self.spawn_timer(generation, deadline)),
                listeners: Vec::new(),
                prompt: None,
            });

            (generation, superseded)
        };

        info!(
            generation,
            action = %kind,
            grace_secs = self.inner.grace.as_secs_f64(),
            "Action scheduled"
        );

        let this = self.clone();
        self.inner.runtime.spawn_blocking(move || {
            this.arm(generation, kind, deadline, superseded.unwrap_or_default())
        });
    }

    /// Cancel whatever is pending. No-op when nothing is. Returns whether
    /// this call was the one that cancelled it.
    pub fn cancel_pending_action(&self) -> bool {
        self.cancel(None)
    }

    /// Cancel the request with this generation, if it is still the pending one.
    pub fn cancel_generation(&self, generation: u64) -> bool {
        self.cancel(Some(generation))
    }

    pub fn status(&self) -> CoordinatorStatus {
        let slot = self.inner.lock_slot();
        if let Some(pending) = &slot.pending {
            return CoordinatorStatus::Pending {
                kind: pending.kind,
                generation: pending.generation,
                requested_at: pending.requested_at,
                remaining: pending.deadline.saturating_duration_since(Instant::now()),
            };
        }
        match slot.executing {
            Some((generation, kind)) => CoordinatorStatus::Executing { kind, generation },
            None => CoordinatorStatus::Idle,
        }
    }

    /// Drop any pending action silently and stop its listeners before
    /// returning. Later requests are ignored. Blocks; call from a blocking
    /// context.
    pub fn shutdown(&self) {
        let entry = {
            let mut slot = self.inner.lock_slot();
            slot.closed = true;
            slot.pending.take()
        };

        let _guard = self.inner.lock_listeners();
        if let Some(mut entry) = entry {
            entry.abort_timer();
            info!(generation = entry.generation, action = %entry.kind, "Pending action dropped on shutdown");
            self.teardown_locked(entry.into_teardown());
        }
        debug!("Coordinator shut down");
    }

    fn cancel(&self, target: Option<u64>) -> bool {
        let entry = {
            let mut slot = self.inner.lock_slot();
            let matches = slot
                .pending
                .as_ref()
                .is_some_and(|p| !matches!(target, Some(g) if g != p.generation));
            if matches {
                slot.pending.take()
            } else {
                None
            }
        };

        let Some(mut entry) = entry else {
            debug!(generation = ?target, "Cancel requested but nothing matching is pending");
            return false;
        };

        entry.abort_timer();
        let kind = entry.kind;
        info!(generation = entry.generation, action = %kind, "Pending action cancelled");

        let teardown = entry.into_teardown();
        let this = self.clone();
        self.inner.runtime.spawn_blocking(move || {
            this.teardown(teardown);
            this.inner.sink.show_transient(
                "Action cancelled",
                &format!("The pending {kind} was cancelled."),
            );
        });
        true
    }

    fn spawn_timer(&self, generation: u64, deadline: Instant) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if let Some(inner) = weak.upgrade() {
                Coordinator { inner }.fire(generation);
            }
        })
    }

    /// Timer expiry. Runs on the timer task itself.
    fn fire(&self, generation: u64) {
        let entry = {
            let mut slot = self.inner.lock_slot();
            if slot
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == generation)
            {
                let entry = slot.pending.take();
                slot.executing = entry.as_ref().map(|p| (p.generation, p.kind));
                entry
            } else {
                None
            }
        };

        let Some(mut entry) = entry else {
            debug!(generation, "Timer fired for a request that is no longer pending");
            return;
        };

        // Our own handle; dropping it detaches rather than aborting.
        entry.timer = None;
        let kind = entry.kind;
        let teardown = entry.into_teardown();

        let this = self.clone();
        self.inner.runtime.spawn_blocking(move || {
            this.teardown(teardown);
            this.execute(generation, kind);
        });
    }

    fn execute(&self, generation: u64, kind: ActionKind) {
        info!(generation, action = %kind, "Grace period elapsed, executing");
        self.inner.sink.show_transient(
            &format!("Executing {kind}"),
            &format!("{APP_NAME} is executing {kind}..."),
        );

        if let Err(e) = self.inner.executor.execute(kind) {
            error!(generation, action = %kind, error = %e, "Action failed");
            self.inner
                .sink
                .show_transient("Action failed", &format!("Failed to {kind}: {e}"));
        }

        let mut slot = self.inner.lock_slot();
        if slot.executing.is_some_and(|(g, _)| g == generation) {
            slot.executing = None;
        }
    }

    /// Blocking half of `request_action`.
    fn arm(&self, generation: u64, kind: ActionKind, deadline: Instant, superseded: Teardown) {
        let _guard = self.inner.lock_listeners();
        self.teardown_locked(superseded);

        if !self.is_current(generation) {
            debug!(generation, "Request left the slot before its listeners started");
            return;
        }

        let mut started = Vec::with_capacity(self.inner.sources.len());
        for source in &self.inner.sources {
            match source.start(self.trigger_for(generation)) {
                Ok(handle) => {
                    debug!(generation, source = source.name(), "Cancel listener started");
                    started.push(handle);
                }
                Err(e) => {
                    for handle in started {
                        handle.stop();
                    }
                    self.abort_request(generation, kind, &e);
                    return;
                }
            }
        }

        let prompt = self.inner.sink.show_cancellable(CancellablePrompt {
            kind,
            title: format!("{APP_NAME}: {kind} pending"),
            body_template: format!(
                "This computer will {} in {{secs}}s. Click here or press any key to cancel.",
                verb(kind)
            ),
            deadline,
            grace: self.inner.grace,
            on_click: self.trigger_for(generation),
        });

        let leftover = {
            let mut slot = self.inner.lock_slot();
            match slot.pending.as_mut() {
                Some(pending) if pending.generation == generation => {
                    pending.listeners = started;
                    pending.prompt = Some(prompt);
                    None
                }
                _ => Some(Teardown {
                    listeners: started,
                    prompt: Some(prompt),
                }),
            }
        };

        if let Some(leftover) = leftover {
            debug!(generation, "Request ended while arming, tearing down");
            self.teardown_locked(leftover);
        }
    }

    /// Listener startup failed: the request never becomes pending.
    fn abort_request(&self, generation: u64, kind: ActionKind, err: &ActionError) {
        error!(generation, action = %kind, error = %err, "Aborting request");

        let entry = {
            let mut slot = self.inner.lock_slot();
            if slot
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == generation)
            {
                slot.pending.take()
            } else {
                None
            }
        };
        if let Some(mut entry) = entry {
            entry.abort_timer();
            self.teardown_locked(entry.into_teardown());
        }

        self.inner.sink.show_transient(
            "Action aborted",
            &format!("Could not schedule {kind}: {err}"),
        );
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner
            .lock_slot()
            .pending
            .as_ref()
            .is_some_and(|p| p.generation == generation)
    }

    fn trigger_for(&self, generation: u64) -> Trigger {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Coordinator { inner }.cancel_generation(generation);
            }
        })
    }

    fn teardown(&self, teardown: Teardown) {
        let _guard = self.inner.lock_listeners();
        self.teardown_locked(teardown);
    }

    /// Caller holds the listener lock.
    fn teardown_locked(&self, teardown: Teardown) {
        for handle in teardown.listeners {
            handle.stop();
        }
        if let Some(prompt) = teardown.prompt {
            self.inner.sink.dismiss(prompt);
        }
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ()> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn verb(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::PowerOff => "power off",
        ActionKind::Suspend => "go to sleep",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Barrier;

    const GRACE: Duration = Duration::from_millis(200);

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<ActionKind>>,
        fail: bool,
    }

    impl ActionExecutor for RecordingExecutor {
        fn execute(&self, kind: ActionKind) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(kind);
            if self.fail {
                return Err(ActionError::CommandFailed {
                    command: kind.command_line(),
                    status: "exit code: 1".into(),
                });
            }
            Ok(())
        }
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<ActionKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        next_id: AtomicU64,
        prompts: Mutex<Vec<(PromptHandle, CancellablePrompt)>>,
        transients: Mutex<Vec<(String, String)>>,
        dismissed: Mutex<Vec<PromptHandle>>,
    }

    impl NotificationSink for RecordingSink {
        fn show_cancellable(&self, prompt: CancellablePrompt) -> PromptHandle {
            let handle = PromptHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.prompts.lock().unwrap().push((handle, prompt));
            handle
        }

        fn show_transient(&self, title: &str, body: &str) {
            self.transients
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }

        fn dismiss(&self, handle: PromptHandle) {
            self.dismissed.lock().unwrap().push(handle);
        }
    }

    impl RecordingSink {
        fn count(&self, title: &str) -> usize {
            self.transients
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == title)
                .count()
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_click(&self) -> Trigger {
            let prompts = self.prompts.lock().unwrap();
            Arc::clone(&prompts.last().unwrap().1.on_click)
        }

        fn dismissed(&self) -> usize {
            self.dismissed.lock().unwrap().len()
        }

        fn body_of(&self, title: &str) -> Option<String> {
            self.transients
                .lock()
                .unwrap()
                .iter()
                .find(|(t, _)| t == title)
                .map(|(_, body)| body.clone())
        }
    }

    #[derive(Default)]
    struct FakeSource {
        started: AtomicUsize,
        stopped: Arc<AtomicUsize>,
        triggers: Mutex<Vec<Trigger>>,
        fail: bool,
    }

    struct FakeStop(Arc<AtomicUsize>);

    impl StopHandle for FakeStop {
        fn stop(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CancelSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn start(&self, trigger: Trigger) -> Result<Box<dyn StopHandle>, ActionError> {
            if self.fail {
                return Err(ActionError::ListenerStart {
                    source_name: "fake",
                    reason: "hook refused".into(),
                });
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            self.triggers.lock().unwrap().push(trigger);
            Ok(Box::new(FakeStop(Arc::clone(&self.stopped))))
        }
    }

    impl FakeSource {
        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn stopped(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }

        fn trigger(&self, index: usize) -> Trigger {
            Arc::clone(&self.triggers.lock().unwrap()[index])
        }

        fn trigger_count(&self) -> usize {
            self.triggers.lock().unwrap().len()
        }
    }

    struct Harness {
        coordinator: Coordinator,
        executor: Arc<RecordingExecutor>,
        sink: Arc<RecordingSink>,
        source: Arc<FakeSource>,
    }

    fn harness_with(executor: RecordingExecutor, source: FakeSource) -> Harness {
        let executor = Arc::new(executor);
        let sink = Arc::new(RecordingSink::default());
        let source = Arc::new(source);
        let coordinator = Coordinator::new(
            GRACE,
            executor.clone(),
            sink.clone(),
            vec![source.clone() as Arc<dyn CancelSource>],
        );
        Harness {
            coordinator,
            executor,
            sink,
            source,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingExecutor::default(), FakeSource::default())
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    /// Long enough for a missed timer to have fired.
    async fn past_grace() {
        tokio::time::sleep(GRACE + Duration::from_millis(250)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_executes_once_after_grace_period() {
        let h = harness();
        let start = Instant::now();
        h.coordinator.request_action(ActionKind::PowerOff);

        assert!(matches!(
            h.coordinator.status(),
            CoordinatorStatus::Pending {
                kind: ActionKind::PowerOff,
                ..
            }
        ));

        assert!(wait_until(|| !h.executor.calls().is_empty()).await);
        assert!(start.elapsed() >= GRACE);

        past_grace().await;
        assert_eq!(h.executor.calls(), vec![ActionKind::PowerOff]);
        assert_eq!(h.sink.count("Executing power off"), 1);
        assert_eq!(h.sink.count("Action cancelled"), 0);
        assert!(wait_until(|| h.coordinator.status().is_idle()).await);
        assert_eq!(h.source.started(), 1);
        assert_eq!(h.source.stopped(), 1);
        assert_eq!(h.sink.dismissed(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_stops_timer_and_notifies_once() {
        let h = harness();
        h.coordinator.request_action(ActionKind::Suspend);
        assert!(wait_until(|| h.sink.prompt_count() == 1).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.coordinator.cancel_pending_action());
        assert!(h.coordinator.status().is_idle());
        assert!(!h.coordinator.cancel_pending_action());

        past_grace().await;
        assert!(h.executor.calls().is_empty());
        assert_eq!(h.sink.count("Action cancelled"), 1);
        assert!(h.sink.body_of("Action cancelled").unwrap().contains("sleep"));
        assert_eq!(h.source.stopped(), 1);
        assert_eq!(h.sink.dismissed(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_request_supersedes_silently() {
        let h = harness();
        let start = Instant::now();
        h.coordinator.request_action(ActionKind::PowerOff);
        tokio::time::sleep(Duration::from_millis(60)).await;
        h.coordinator.request_action(ActionKind::Suspend);

        assert!(wait_until(|| !h.executor.calls().is_empty()).await);
        assert!(start.elapsed() >= GRACE + Duration::from_millis(60));

        past_grace().await;
        assert_eq!(h.executor.calls(), vec![ActionKind::Suspend]);
        assert_eq!(h.sink.count("Action cancelled"), 0);
        assert!(wait_until(|| h.source.stopped() == h.source.started()).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_click_and_key_cancel_once() {
        let h = harness();
        h.coordinator.request_action(ActionKind::PowerOff);
        assert!(wait_until(|| h.sink.prompt_count() == 1 && h.source.trigger_count() == 1).await);

        let click = h.sink.last_click();
        let key = h.source.trigger(0);
        let barrier = Arc::new(Barrier::new(2));
        let threads: Vec<_> = [click, key]
            .into_iter()
            .map(|trigger| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    trigger();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        past_grace().await;
        assert!(h.executor.calls().is_empty());
        assert_eq!(h.sink.count("Action cancelled"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_cancels_have_one_winner() {
        let h = harness();
        h.coordinator.request_action(ActionKind::Suspend);

        let n = 16;
        let barrier = Arc::new(Barrier::new(n));
        let threads: Vec<_> = (0..n)
            .map(|_| {
                let coordinator = h.coordinator.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    coordinator.cancel_pending_action();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        past_grace().await;
        assert!(h.executor.calls().is_empty());
        assert_eq!(h.sink.count("Action cancelled"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_after_execution_has_no_effect() {
        let h = harness();
        h.coordinator.request_action(ActionKind::PowerOff);
        assert!(wait_until(|| !h.executor.calls().is_empty()).await);

        h.coordinator.cancel_pending_action();
        h.source.trigger(0)();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.executor.calls().len(), 1);
        assert_eq!(h.sink.count("Action cancelled"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_trigger_does_not_cancel_newer_request() {
        let h = harness();
        h.coordinator.request_action(ActionKind::PowerOff);
        assert!(wait_until(|| h.source.trigger_count() == 1).await);
        let stale = h.source.trigger(0);

        h.coordinator.request_action(ActionKind::Suspend);
        assert!(wait_until(|| h.source.trigger_count() == 2).await);
        stale();

        assert!(matches!(
            h.coordinator.status(),
            CoordinatorStatus::Pending {
                kind: ActionKind::Suspend,
                ..
            }
        ));
        assert!(wait_until(|| !h.executor.calls().is_empty()).await);
        assert_eq!(h.executor.calls(), vec![ActionKind::Suspend]);
        assert_eq!(h.sink.count("Action cancelled"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_failure_leaves_idle() {
        let h = harness_with(
            RecordingExecutor::default(),
            FakeSource {
                fail: true,
                ..Default::default()
            },
        );
        h.coordinator.request_action(ActionKind::PowerOff);

        assert!(wait_until(|| h.sink.count("Action aborted") == 1).await);
        assert!(h.coordinator.status().is_idle());
        assert_eq!(h.sink.prompt_count(), 0);

        past_grace().await;
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_executor_failure_is_reported() {
        let h = harness_with(
            RecordingExecutor {
                fail: true,
                ..Default::default()
            },
            FakeSource::default(),
        );
        h.coordinator.request_action(ActionKind::Suspend);

        assert!(wait_until(|| h.sink.count("Action failed") == 1).await);
        assert!(wait_until(|| h.coordinator.status().is_idle()).await);
        past_grace().await;
        assert_eq!(h.executor.calls().len(), 1);
        assert_eq!(h.sink.count("Action failed"), 1);
        assert!(h.sink.body_of("Action failed").unwrap().contains("sleep"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_with_nothing_pending_is_silent() {
        let h = harness();
        assert!(!h.coordinator.cancel_pending_action());
        assert!(!h.coordinator.cancel_generation(42));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.sink.transients.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prompt_describes_countdown() {
        let h = harness();
        h.coordinator.request_action(ActionKind::Suspend);
        assert!(wait_until(|| h.sink.prompt_count() == 1).await);

        let prompts = h.sink.prompts.lock().unwrap();
        let prompt = &prompts[0].1;
        assert_eq!(prompt.kind, ActionKind::Suspend);
        assert_eq!(prompt.grace, GRACE);
        assert!(prompt.body_template.contains("{secs}"));
        assert!(prompt.body_template.contains("go to sleep"));
    }

    /// Counts live listeners; start and stop sleep to widen any overlap window.
    #[derive(Default)]
    struct CountingSource {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct CountingStop(Arc<AtomicUsize>);

    impl StopHandle for CountingStop {
        fn stop(self: Box<Self>) {
            std::thread::sleep(Duration::from_millis(1));
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl CancelSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn start(&self, _trigger: Trigger) -> Result<Box<dyn StopHandle>, ActionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            Ok(Box::new(CountingStop(Arc::clone(&self.active))))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listeners_never_overlap_under_churn() {
        let source = Arc::new(CountingSource::default());
        let coordinator = Coordinator::new(
            GRACE,
            Arc::new(RecordingExecutor::default()),
            Arc::new(RecordingSink::default()),
            vec![source.clone() as Arc<dyn CancelSource>],
        );

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for i in 0..50 {
                        match (t + i) % 3 {
                            0 => coordinator.request_action(ActionKind::PowerOff),
                            1 => coordinator.request_action(ActionKind::Suspend),
                            _ => {
                                coordinator.cancel_pending_action();
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // A last request that surely arms, so the peak is at least one.
        coordinator.request_action(ActionKind::Suspend);
        assert!(wait_until(|| source.active.load(Ordering::SeqCst) == 1).await);
        coordinator.cancel_pending_action();

        assert!(wait_until(|| source.active.load(Ordering::SeqCst) == 0).await);
        assert!(wait_until(|| coordinator.status().is_idle()).await);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_stops_listeners_and_rejects_requests() {
        let h = harness();
        h.coordinator.request_action(ActionKind::PowerOff);
        assert!(wait_until(|| h.source.started() == 1).await);

        let coordinator = h.coordinator.clone();
        tokio::task::spawn_blocking(move || coordinator.shutdown())
            .await
            .unwrap();
        assert_eq!(h.source.stopped(), 1);

        h.coordinator.request_action(ActionKind::Suspend);
        past_grace().await;
        assert!(h.executor.calls().is_empty());
        assert!(h.coordinator.status().is_idle());
        assert_eq!(h.sink.count("Action cancelled"), 0);
    }
}
