//! Reconciliation of whole-state snapshots into an ordered event history.
//!
//! The reconciler holds all mutable state of one watch session and is
//! driven by the scheduler. It never does I/O and never reads the clock:
//! every operation takes `now`, which keeps it testable without a runtime.

use serde_json::Value;
use std::collections::BTreeSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::client::ApiError;
use crate::config::WatchSettings;
use crate::dedup::EventDeduplicator;
use crate::event::{Event, EventKind, Milestone};
use crate::format;
use crate::normalize::{normalize, WorkflowSnapshot};
use crate::session::{SessionView, WatchPhase};
use crate::task::{StepId, Task, TaskId, TaskRecord, TaskStatus};
use crate::widget::extract_widgets;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The snapshot was processed; `new_events` may be zero.
    Accepted { new_events: usize },
    /// Identical snapshot inside the rate-limit window; nothing was touched.
    Throttled,
    /// Another fetch was still in flight.
    Skipped,
    /// Transient failure; the next tick tries again.
    Retrying,
    /// The session has ended. No further fetches happen.
    Finished(WatchPhase),
}

/// Last snapshot that passed the rate-limit gate.
#[derive(Debug)]
struct AcceptedSnapshot {
    status: TaskStatus,
    raw: Value,
    at: Instant,
}

/// Per-session reconciliation state. Never shared between sessions.
#[derive(Debug)]
pub struct Reconciler {
    session_id: Uuid,
    task_id: TaskId,
    settings: WatchSettings,
    phase: WatchPhase,
    task: Option<Task>,
    events: Vec<Event>,
    dedup: EventDeduplicator,
    completed_steps: BTreeSet<StepId>,
    step_order: Vec<StepId>,
    last_accepted: Option<AcceptedSnapshot>,
    snapshot: Option<WorkflowSnapshot>,
    widgets: Vec<Value>,
    instruction_seq: u64,
}

impl Reconciler {
    pub fn new(task_id: impl Into<TaskId>, settings: WatchSettings) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            task_id: task_id.into(),
            settings,
            phase: WatchPhase::Idle,
            task: None,
            events: Vec::new(),
            dedup: EventDeduplicator::new(settings.dedup_window),
            completed_steps: BTreeSet::new(),
            step_order: Vec::new(),
            last_accepted: None,
            snapshot: None,
            widgets: Vec::new(),
            instruction_seq: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn snapshot(&self) -> Option<&WorkflowSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn widgets(&self) -> &[Value] {
        &self.widgets
    }

    /// Check the task id before anything touches the network.
    ///
    /// Returns `false` (and records the invalid-id event) when the id can
    /// never be polled.
    pub fn validate(&mut self, now: Instant) -> bool {
        if self.phase != WatchPhase::Idle {
            return !self.phase.is_finished();
        }
        self.phase = WatchPhase::Validating;

        if self.task_id.is_valid() {
            self.phase = WatchPhase::Polling;
            return true;
        }

        tracing::warn!("Refusing to poll invalid task id {:?}", self.task_id.as_str());
        let content = format::invalid_message(&self.task_id);
        self.emit(Milestone::Invalid, EventKind::TaskInvalid, content, now);
        self.phase = WatchPhase::Invalid;
        false
    }

    /// Reconcile one task-status response.
    pub fn apply(&mut self, record: TaskRecord, now: Instant) -> TickOutcome {
        if self.phase.is_finished() {
            return TickOutcome::Finished(self.phase);
        }

        let status = TaskStatus::from_wire(&record.status);
        if self.is_rate_limited(status, &record.result, now) {
            tracing::debug!("Discarding unchanged {} snapshot for {}", status, self.task_id);
            return TickOutcome::Throttled;
        }
        self.last_accepted = Some(AcceptedSnapshot {
            status,
            raw: record.result.clone(),
            at: now,
        });

        let task = match self.task.take() {
            Some(mut task) => {
                task.update(&record);
                task
            }
            None => Task::from_record(self.task_id.clone(), &record),
        };
        self.task = Some(task);

        let before = self.events.len();
        let snapshot = normalize(status, &record.result, record.error_message().as_deref());

        let initial = self.initial_message();
        self.emit(Milestone::Initial, EventKind::Initial, initial, now);

        for (step_id, step) in &snapshot.steps {
            // First observation wins; later payloads for this step are ignored.
            if !self.completed_steps.insert(step_id.clone()) {
                continue;
            }
            self.step_order.push(step_id.clone());
            let content = format::format_step(step_id, &step.payload);
            self.emit(
                Milestone::Step(step_id.clone()),
                EventKind::StepCompleted,
                content,
                now,
            );
        }

        self.widgets = extract_widgets(&snapshot.steps);

        match status {
            TaskStatus::Completed => {
                let content = format::success_message(&snapshot);
                self.emit(Milestone::Completion, EventKind::TaskCompleted, content, now);
                self.finish(WatchPhase::Completed);
            }
            TaskStatus::Failed => {
                let content = format::failure_message(snapshot.error.as_deref());
                self.emit(Milestone::Failure, EventKind::TaskFailed, content, now);
                self.finish(WatchPhase::Failed);
            }
            TaskStatus::NotFound => {
                let content = format::not_found_message(&self.task_id);
                self.emit(Milestone::NotFound, EventKind::TaskNotFound, content, now);
                self.finish(WatchPhase::NotFound);
            }
            TaskStatus::Invalid => {
                let content = format::invalid_message(&self.task_id);
                self.emit(Milestone::Invalid, EventKind::TaskInvalid, content, now);
                self.finish(WatchPhase::Invalid);
            }
            TaskStatus::Pending | TaskStatus::Processing => {
                self.phase = WatchPhase::Polling;
            }
        }

        self.snapshot = Some(snapshot);

        if self.phase.is_finished() {
            TickOutcome::Finished(self.phase)
        } else {
            TickOutcome::Accepted {
                new_events: self.events.len() - before,
            }
        }
    }

    /// The task-status service reported the task as missing.
    pub fn not_found(&mut self, now: Instant) -> TickOutcome {
        if self.phase.is_finished() {
            return TickOutcome::Finished(self.phase);
        }
        if let Some(task) = &mut self.task {
            task.status = TaskStatus::NotFound;
        }
        let content = format::not_found_message(&self.task_id);
        self.emit(Milestone::NotFound, EventKind::TaskNotFound, content, now);
        self.finish(WatchPhase::NotFound);
        TickOutcome::Finished(self.phase)
    }

    /// Caller-driven end of the session. No event is produced.
    pub fn stop(&mut self) {
        if !self.phase.is_finished() {
            tracing::info!("Stopped watching task {}", self.task_id);
            self.phase = WatchPhase::Stopped;
        }
    }

    /// Record the outcome of a follow-up instruction. The phase is untouched.
    pub fn record_instruction(
        &mut self,
        instruction: &str,
        outcome: Result<(), &ApiError>,
        now: Instant,
    ) -> Option<&Event> {
        self.instruction_seq += 1;
        let milestone = Milestone::Instruction(self.instruction_seq);
        let (kind, content) = match outcome {
            Ok(()) => (
                EventKind::InstructionAccepted,
                format!("Instruction received: {}", instruction.trim()),
            ),
            Err(e) => (
                EventKind::InstructionRejected,
                format!("Instruction could not be submitted: {}", e.message),
            ),
        };
        if self.emit(milestone, kind, content, now) {
            self.events.last()
        } else {
            None
        }
    }

    /// Snapshot of everything the rendering layer shows.
    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id,
            task_id: self.task_id.clone(),
            phase: self.phase,
            task: self.task.clone(),
            events: self.events.clone(),
            snapshot: self.snapshot.clone(),
            widgets: self.widgets.clone(),
            completed_steps: self.step_order.clone(),
        }
    }

    fn is_rate_limited(&self, status: TaskStatus, raw: &Value, now: Instant) -> bool {
        match &self.last_accepted {
            Some(last) => {
                now.saturating_duration_since(last.at) < self.settings.rate_limit_window
                    && last.status == status
                    && last.raw == *raw
            }
            None => false,
        }
    }

    fn initial_message(&self) -> String {
        match self.task.as_ref().and_then(|t| t.original_request.as_deref()) {
            Some(request) => format!("Working on your request: {}", request),
            None => format!("Started tracking task {}.", self.task_id),
        }
    }

    fn emit(&mut self, milestone: Milestone, kind: EventKind, content: String, now: Instant) -> bool {
        let event = Event::new(&self.task_id, milestone, kind, content);
        match self.dedup.admit(&event, now) {
            Ok(()) => {
                tracing::debug!("Event {} ({})", event.id, event.kind);
                self.events.push(event);
                true
            }
            Err(_) => false,
        }
    }

    fn finish(&mut self, phase: WatchPhase) {
        tracing::info!("Task {} finished: {}", self.task_id, phase);
        self.phase = phase;
    }
}
