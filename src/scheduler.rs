//! Poll scheduler: the only part of the engine with a lifecycle and the
//! only part that touches the network.
//!
//! One `TaskWatcher` observes one task. It polls on a fixed interval, never
//! runs two fetches at once, and stops for good when the task reaches a
//! terminal state, the id turns out to be invalid or missing, or the caller
//! cancels. Transient failures are logged and retried on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

use crate::client::{ApiError, ApiErrorKind, InstructionRequest, TaskApi};
use crate::config::WatchSettings;
use crate::engine::{Reconciler, TickOutcome};
use crate::event::Event;
use crate::session::{SessionContext, SessionView, WatchPhase};
use crate::task::TaskId;

/// Held while a fetch is outstanding; clears the flag on every exit path,
/// including when the fetch future is dropped by cancellation.
///
/// Within one watcher `poll_once` borrows `&mut self`, so fetches cannot
/// overlap and the run loop never finds the flag held; skipping ticks there
/// comes from `MissedTickBehavior::Skip`. The flag is what `WatchHandle::is_polling`
/// reads from outside the spawned task.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Watches one task until it finishes or the caller stops it.
pub struct TaskWatcher {
    api: Arc<dyn TaskApi>,
    reconciler: Reconciler,
    settings: WatchSettings,
    in_flight: Arc<AtomicBool>,
    views: watch::Sender<SessionView>,
}

impl TaskWatcher {
    /// Create a watcher. The task id is validated here, before any fetch:
    /// an invalid id leaves the watcher already finished with a single
    /// invalid-id event.
    pub fn new(api: Arc<dyn TaskApi>, task_id: impl Into<TaskId>, settings: WatchSettings) -> Self {
        let mut reconciler = Reconciler::new(task_id, settings);
        reconciler.validate(Instant::now());
        let (views, _) = watch::channel(reconciler.view());
        Self {
            api,
            reconciler,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            views,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        self.reconciler.task_id()
    }

    pub fn phase(&self) -> WatchPhase {
        self.reconciler.phase()
    }

    pub fn events(&self) -> &[Event] {
        self.reconciler.events()
    }

    pub fn view(&self) -> SessionView {
        self.reconciler.view()
    }

    /// Receive a fresh view after every accepted tick.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.views.subscribe()
    }

    /// Whether a fetch is outstanding right now.
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a single tick: fetch, reconcile, publish.
    ///
    /// Once the session is finished this returns immediately without a
    /// network call. Returns `Skipped` without fetching if the in-flight
    /// flag is already held.
    pub async fn poll_once(&mut self) -> TickOutcome {
        if self.reconciler.is_finished() {
            return TickOutcome::Finished(self.reconciler.phase());
        }

        let flag = Arc::clone(&self.in_flight);
        let Some(_guard) = InFlight::acquire(&flag) else {
            tracing::debug!("Fetch still in flight for {}, skipping tick", self.task_id());
            return TickOutcome::Skipped;
        };

        let task_id = self.task_id().clone();
        let result = self.api.task_status(&task_id).await;
        let now = Instant::now();

        let outcome = match result {
            Ok(record) => self.reconciler.apply(record, now),
            Err(e) if e.is_terminal() => {
                tracing::info!("Task {} not found: {}", task_id, e.message);
                self.reconciler.not_found(now)
            }
            Err(e) => {
                tracing::warn!("Polling task {} failed, retrying next tick: {}", task_id, e);
                TickOutcome::Retrying
            }
        };

        if matches!(
            outcome,
            TickOutcome::Accepted { .. } | TickOutcome::Finished(_)
        ) {
            self.publish();
        }
        outcome
    }

    /// Submit a follow-up instruction and record the outcome as an event.
    ///
    /// Does not affect polling. An invalid task id is rejected locally.
    pub async fn send_instruction(
        &mut self,
        instruction: &str,
        ctx: &SessionContext,
    ) -> Option<Event> {
        let result = if self.task_id().is_valid() {
            let request = InstructionRequest {
                task_id: self.task_id().clone(),
                instruction: instruction.trim().to_string(),
                user_id: ctx.user_id.clone(),
            };
            self.api.submit_instruction(&request).await
        } else {
            Err(ApiError::new(ApiErrorKind::ClientError, "invalid task id"))
        };

        if let Err(e) = &result {
            tracing::warn!("Instruction for task {} rejected: {}", self.task_id(), e);
        }

        let event = self
            .reconciler
            .record_instruction(instruction, result.as_ref().map(|_| ()), Instant::now())
            .cloned();
        self.publish();
        event
    }

    /// End the session. Later calls to `poll_once` do nothing.
    pub fn stop(&mut self) {
        self.reconciler.stop();
        self.in_flight.store(false, Ordering::Release);
        self.publish();
    }

    /// Poll until the session finishes or `cancel` fires.
    ///
    /// Ticks that come due while a fetch is outstanding are skipped rather
    /// than queued (`MissedTickBehavior::Skip`). A fetch in flight at cancellation is dropped and its
    /// result discarded.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionView {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.reconciler.is_finished() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop();
                    break;
                }
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = self.poll_once() => Some(outcome),
            };

            match outcome {
                None => {
                    self.stop();
                    break;
                }
                Some(TickOutcome::Finished(phase)) => {
                    tracing::debug!("Watch loop ending in phase {}", phase);
                    break;
                }
                Some(_) => {}
            }
        }

        self.view()
    }

    /// Run on the tokio runtime. Dropping the handle cancels the session.
    pub fn spawn(self) -> WatchHandle {
        let cancel = CancellationToken::new();
        let views = self.subscribe();
        let in_flight = Arc::clone(&self.in_flight);
        let span = tracing::info_span!(
            "watch",
            task_id = %self.task_id(),
            session_id = %self.reconciler.session_id()
        );
        let join = tokio::spawn(self.run(cancel.clone()).instrument(span));

        WatchHandle {
            guard: cancel.clone().drop_guard(),
            cancel,
            views,
            in_flight,
            join,
        }
    }

    fn publish(&self) {
        self.views.send_replace(self.reconciler.view());
    }
}

/// Handle to a spawned watcher.
pub struct WatchHandle {
    cancel: CancellationToken,
    guard: DropGuard,
    views: watch::Receiver<SessionView>,
    in_flight: Arc<AtomicBool>,
    join: JoinHandle<SessionView>,
}

impl WatchHandle {
    pub fn views(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Cancel the session. Takes effect before the next fetch starts; a
    /// fetch already in flight is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to end and return its final view.
    pub async fn finished(self) -> SessionView {
        let WatchHandle {
            guard, views, join, ..
        } = self;
        let result = join.await;
        drop(guard);
        match result {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!("Watch task ended abnormally: {}", e);
                let view = views.borrow().clone();
                view
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::task::{StepId, TaskRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses; the last one repeats once exhausted.
    struct ScriptedApi {
        responses: Mutex<VecDeque<Result<TaskRecord, ApiError>>>,
        last: Mutex<Option<Result<TaskRecord, ApiError>>>,
        delay: Duration,
        calls: AtomicUsize,
        instructions: Mutex<Vec<InstructionRequest>>,
        reject_instructions: bool,
    }

    impl ScriptedApi {
        fn new(responses: Vec<Result<TaskRecord, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(None),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                instructions: Mutex::new(Vec::new()),
                reject_instructions: false,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskApi for ScriptedApi {
        async fn task_status(&self, _task_id: &TaskId) -> Result<TaskRecord, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.responses.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(response) => {
                    *last = Some(response.clone());
                    response
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(ApiError::network_error("no script"))),
            }
        }

        async fn submit_instruction(&self, request: &InstructionRequest) -> Result<(), ApiError> {
            self.instructions.lock().unwrap().push(request.clone());
            if self.reject_instructions {
                Err(ApiError::rejected("task is read-only"))
            } else {
                Ok(())
            }
        }
    }

    fn settings() -> WatchSettings {
        WatchSettings::default()
    }

    fn kinds(view: &SessionView) -> Vec<EventKind> {
        view.events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_in_flight_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let first = InFlight::acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_id_makes_no_network_call() {
        let api = Arc::new(ScriptedApi::new(vec![]));
        let watcher = TaskWatcher::new(api.clone(), "undefined", settings());
        assert_eq!(watcher.phase(), WatchPhase::Invalid);

        let view = watcher.run(CancellationToken::new()).await;
        assert_eq!(api.calls(), 0);
        assert_eq!(kinds(&view), vec![EventKind::TaskInvalid]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_until_completed() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(TaskRecord::new("pending", json!({}))),
            Ok(TaskRecord::new(
                "processing",
                json!({"steps": {"research": {"sources": 3}}}),
            )),
            Ok(TaskRecord::new(
                "completed",
                json!({
                    "steps": {"research": {"sources": 3}, "compilation": {}},
                    "flights": [{"airline": "A"}, {"airline": "B"}, {"airline": "C"}],
                    "hotels": [{"name": "H1"}, {"name": "H2"}]
                }),
            )),
        ]));
        let watcher = TaskWatcher::new(api.clone(), "trip-9", settings());

        let view = watcher.run(CancellationToken::new()).await;

        assert_eq!(view.phase, WatchPhase::Completed);
        assert_eq!(api.calls(), 3);
        assert_eq!(
            kinds(&view),
            vec![
                EventKind::Initial,
                EventKind::StepCompleted,
                EventKind::StepCompleted,
                EventKind::TaskCompleted
            ]
        );
        assert_eq!(
            view.completed_steps,
            vec![StepId::Research, StepId::Compilation]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_stops_polling() {
        let api = Arc::new(ScriptedApi::new(vec![Err(ApiError::http(404, "Task not found"))]));
        let mut watcher = TaskWatcher::new(api.clone(), "gone", settings());

        let outcome = watcher.poll_once().await;
        assert_eq!(outcome, TickOutcome::Finished(WatchPhase::NotFound));

        // A manually triggered poll afterwards is a no-op.
        let again = watcher.poll_once().await;
        assert_eq!(again, TickOutcome::Finished(WatchPhase::NotFound));
        assert_eq!(api.calls(), 1);
        assert_eq!(
            watcher.events().iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![EventKind::TaskNotFound]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_silently() {
        let api = Arc::new(ScriptedApi::new(vec![
            Err(ApiError::network_error("connection reset")),
            Err(ApiError::http(502, "bad gateway")),
            Err(ApiError::parse_error("truncated body")),
            Ok(TaskRecord::new("failed", json!({})).with_error("ran out of budget")),
        ]));
        let watcher = TaskWatcher::new(api.clone(), "t1", settings());

        let view = watcher.run(CancellationToken::new()).await;

        assert_eq!(api.calls(), 4);
        assert_eq!(view.phase, WatchPhase::Failed);
        assert_eq!(kinds(&view), vec![EventKind::Initial, EventKind::TaskFailed]);
        assert_eq!(
            view.terminal_event().unwrap().content,
            "Task failed: ran out of budget"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_refused_while_flag_held() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(TaskRecord::new("pending", json!({})))]));
        let mut watcher = TaskWatcher::new(api.clone(), "t1", settings());

        watcher.in_flight.store(true, Ordering::Release);
        assert_eq!(watcher.poll_once().await, TickOutcome::Skipped);
        assert_eq!(api.calls(), 0);

        watcher.in_flight.store(false, Ordering::Release);
        assert!(matches!(
            watcher.poll_once().await,
            TickOutcome::Accepted { .. }
        ));
        assert!(!watcher.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_snapshots_produce_no_new_events() {
        let raw = json!({"steps": {"planning": {"destination": "Rome"}}});
        let api = Arc::new(ScriptedApi::new(vec![Ok(TaskRecord::new("processing", raw))]));
        let fast = WatchSettings {
            poll_interval: Duration::from_millis(500),
            ..WatchSettings::default()
        };
        let watcher = TaskWatcher::new(api.clone(), "t1", fast);
        let handle = watcher.spawn();
        let views = handle.views();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(api.calls() >= 10);
        assert_eq!(views.borrow().events.len(), 2);

        handle.stop();
        let view = handle.finished().await;
        assert_eq!(view.phase, WatchPhase::Stopped);
        assert_eq!(view.events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_stretches_interval_without_overlap() {
        let api = Arc::new(
            ScriptedApi::new(vec![Ok(TaskRecord::new("processing", json!({})))])
                .with_delay(Duration::from_secs(6)),
        );
        let watcher = TaskWatcher::new(api.clone(), "t1", settings());
        let handle = watcher.spawn();

        tokio::time::sleep(Duration::from_secs(20)).await;
        let calls = api.calls();
        assert!((2..=4).contains(&calls), "unexpected call count {}", calls);

        handle.stop();
        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_fetch() {
        let api = Arc::new(
            ScriptedApi::new(vec![Ok(TaskRecord::new(
                "completed",
                json!({"summary": "done"}),
            ))])
            .with_delay(Duration::from_secs(10)),
        );
        let watcher = TaskWatcher::new(api.clone(), "t1", settings());
        let handle = watcher.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_polling());

        handle.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_polling());

        let view = handle.finished().await;
        assert_eq!(view.phase, WatchPhase::Stopped);
        assert!(view.events.is_empty());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_session() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(TaskRecord::new("pending", json!({})))]));
        let watcher = TaskWatcher::new(api.clone(), "t1", settings());
        let handle = watcher.spawn();
        let views = handle.views();

        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let calls = api.calls();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.calls(), calls);
        assert_eq!(views.borrow().phase, WatchPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_instruction_records_outcome() {
        let api = Arc::new(ScriptedApi::new(vec![]));
        let mut watcher = TaskWatcher::new(api.clone(), "t1", settings());
        let ctx = SessionContext {
            user_id: Some("user-1".to_string()),
            navigation_blocked: false,
        };

        let event = watcher.send_instruction(" Add a day trip ", &ctx).await.unwrap();
        assert_eq!(event.kind, EventKind::InstructionAccepted);
        assert_eq!(watcher.phase(), WatchPhase::Polling);

        let sent = api.instructions.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].instruction, "Add a day trip");
        assert_eq!(sent[0].user_id.as_deref(), Some("user-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_instruction_rejections() {
        let mut scripted = ScriptedApi::new(vec![]);
        scripted.reject_instructions = true;
        let api = Arc::new(scripted);
        let mut watcher = TaskWatcher::new(api.clone(), "t1", settings());

        let event = watcher
            .send_instruction("Change hotel", &SessionContext::default())
            .await
            .unwrap();
        assert_eq!(event.kind, EventKind::InstructionRejected);
        assert!(event.content.contains("read-only"));

        let api = Arc::new(ScriptedApi::new(vec![]));
        let mut invalid = TaskWatcher::new(api.clone(), "null", settings());
        let event = invalid
            .send_instruction("Change hotel", &SessionContext::default())
            .await
            .unwrap();
        assert_eq!(event.kind, EventKind::InstructionRejected);
        assert!(api.instructions.lock().unwrap().is_empty());
    }
}
