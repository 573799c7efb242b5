//! Events: the deduplicated, user-visible units of progress output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::{StepId, TaskId};

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Initial,
    StepCompleted,
    TaskCompleted,
    TaskFailed,
    TaskNotFound,
    TaskInvalid,
    InstructionAccepted,
    InstructionRejected,
}

impl EventKind {
    /// Terminal kinds end the session; at most one is ever emitted per task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TaskCompleted | Self::TaskFailed | Self::TaskNotFound | Self::TaskInvalid
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::StepCompleted => "step_completed",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskNotFound => "task_not_found",
            Self::TaskInvalid => "task_invalid",
            Self::InstructionAccepted => "instruction_accepted",
            Self::InstructionRejected => "instruction_rejected",
        };
        f.write_str(s)
    }
}

/// Logical milestone of a task. Each milestone maps to exactly one event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Milestone {
    Initial,
    Step(StepId),
    Completion,
    Failure,
    NotFound,
    Invalid,
    /// Follow-up instructions are not milestones of the task itself, so each
    /// submission carries its own sequence number.
    Instruction(u64),
}

impl Milestone {
    /// Deterministic event id for this milestone of `task_id`.
    pub fn event_id(&self, task_id: &TaskId) -> String {
        match self {
            Self::Initial => format!("{}:initial", task_id),
            Self::Step(step) => format!("{}:step:{}", task_id, step),
            Self::Completion => format!("{}:completion", task_id),
            Self::Failure => format!("{}:failure", task_id),
            Self::NotFound => format!("{}:not-found", task_id),
            Self::Invalid => format!("{}:invalid", task_id),
            Self::Instruction(seq) => format!("{}:instruction:{}", task_id, seq),
        }
    }
}

/// One progress event. Append-only once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        task_id: &TaskId,
        milestone: Milestone,
        kind: EventKind,
        content: impl Into<String>,
    ) -> Self {
        let step_id = match &milestone {
            Milestone::Step(step) => Some(step.clone()),
            _ => None,
        };
        Self {
            id: milestone.event_id(task_id),
            kind,
            content: content.into(),
            step_id,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_deterministic() {
        let task = TaskId::new("abc");
        assert_eq!(Milestone::Initial.event_id(&task), "abc:initial");
        assert_eq!(
            Milestone::Step(StepId::Research).event_id(&task),
            "abc:step:research"
        );
        assert_eq!(Milestone::NotFound.event_id(&task), "abc:not-found");
        assert_eq!(
            Milestone::Step(StepId::Research).event_id(&task),
            Milestone::Step(StepId::parse("research")).event_id(&task)
        );
    }

    #[test]
    fn test_step_event_carries_step_id() {
        let task = TaskId::new("abc");
        let event = Event::new(
            &task,
            Milestone::Step(StepId::Planning),
            EventKind::StepCompleted,
            "done",
        );
        assert_eq!(event.step_id, Some(StepId::Planning));

        let event = Event::new(&task, Milestone::Completion, EventKind::TaskCompleted, "ok");
        assert!(event.step_id.is_none());
        assert!(event.kind.is_terminal());
    }
}
