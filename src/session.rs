//! Session state handed to the rendering layer.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::event::Event;
use crate::normalize::WorkflowSnapshot;
use crate::task::{StepId, Task, TaskId};

/// Lifecycle of one watch session.
///
/// ```text
/// Idle -> Validating -> Polling -> Completed | Failed | NotFound | Invalid
///                 \--> Invalid
/// any non-finished phase -> Stopped (caller cancelled)
/// ```
///
/// Rate-limited ticks are a per-tick skip decision, not a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchPhase {
    Idle,
    Validating,
    Polling,
    Completed,
    Failed,
    NotFound,
    Invalid,
    Stopped,
}

impl WatchPhase {
    /// Reached through the task's own outcome; one terminal event exists.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::NotFound | Self::Invalid
        )
    }

    /// No further polls happen in this phase.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() || *self == Self::Stopped
    }
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Cross-cutting UI state the caller owns and passes in explicitly.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Attached to follow-up instructions.
    pub user_id: Option<String>,
    /// Something elsewhere in the UI (e.g. an open modal) is holding
    /// automatic navigation back.
    pub navigation_blocked: bool,
}

/// Everything the rendering layer needs, re-derived after every accepted tick.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub task_id: TaskId,
    pub phase: WatchPhase,
    pub task: Option<Task>,
    pub events: Vec<Event>,
    pub snapshot: Option<WorkflowSnapshot>,
    pub widgets: Vec<Value>,
    /// Steps with a step-completed event, in emission order.
    pub completed_steps: Vec<StepId>,
}

/// Number of known steps a task goes through.
const KNOWN_STEPS: usize = 4;

impl SessionView {
    /// The single terminal event, once there is one.
    pub fn terminal_event(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.kind.is_terminal())
    }

    /// Fraction of the known steps completed, for progress bars.
    pub fn progress(&self) -> f32 {
        if self.phase == WatchPhase::Completed {
            return 1.0;
        }
        let known = self.completed_steps.iter().filter(|s| s.is_known()).count();
        known.min(KNOWN_STEPS) as f32 / KNOWN_STEPS as f32
    }

    /// Whether the caller may navigate to the finished result.
    pub fn ready_for_navigation(&self, ctx: &SessionContext) -> bool {
        self.phase == WatchPhase::Completed && !ctx.navigation_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(phase: WatchPhase, completed_steps: Vec<StepId>) -> SessionView {
        SessionView {
            session_id: Uuid::new_v4(),
            task_id: TaskId::new("t1"),
            phase,
            task: None,
            events: Vec::new(),
            snapshot: None,
            widgets: Vec::new(),
            completed_steps,
        }
    }

    #[test]
    fn test_phase_classification() {
        assert!(!WatchPhase::Polling.is_finished());
        assert!(WatchPhase::Stopped.is_finished());
        assert!(!WatchPhase::Stopped.is_terminal());
        assert!(WatchPhase::NotFound.is_terminal());
    }

    #[test]
    fn test_progress_counts_known_steps() {
        let v = view(
            WatchPhase::Polling,
            vec![StepId::Planning, StepId::Unknown("extra".into())],
        );
        assert_eq!(v.progress(), 0.25);
        assert_eq!(view(WatchPhase::Completed, vec![]).progress(), 1.0);
    }

    #[test]
    fn test_navigation_respects_context() {
        let done = view(WatchPhase::Completed, vec![]);
        let mut ctx = SessionContext::default();
        assert!(done.ready_for_navigation(&ctx));

        ctx.navigation_blocked = true;
        assert!(!done.ready_for_navigation(&ctx));

        ctx.navigation_blocked = false;
        assert!(!view(WatchPhase::Failed, vec![]).ready_for_navigation(&ctx));
    }
}
