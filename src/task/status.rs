use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an observed task.
///
/// `Pending`, `Processing`, `Completed` and `Failed` come from the remote
/// service. `NotFound` and `Invalid` are derived locally from a not-found
/// response or a malformed task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    NotFound,
    Invalid,
}

impl TaskStatus {
    /// Parse a status string as sent by the task-status service.
    ///
    /// Unknown strings map to `Processing`: the task exists and has not
    /// reported a terminal outcome, so polling continues.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "processing" | "running" | "in_progress" => Self::Processing,
            "completed" | "complete" | "done" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "not_found" | "not-found" => Self::NotFound,
            "invalid" => Self::Invalid,
            other => {
                tracing::debug!("Unrecognised task status {:?}, treating as processing", other);
                Self::Processing
            }
        }
    }

    /// Whether polling stops permanently once this status is observed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::NotFound | Self::Invalid
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_aliases() {
        assert_eq!(TaskStatus::from_wire("PENDING"), TaskStatus::Pending);
        assert_eq!(TaskStatus::from_wire("running"), TaskStatus::Processing);
        assert_eq!(TaskStatus::from_wire(" completed "), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_wire("error"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_wire("not-found"), TaskStatus::NotFound);
    }

    #[test]
    fn test_unknown_status_keeps_polling() {
        let status = TaskStatus::from_wire("thinking_hard");
        assert_eq!(status, TaskStatus::Processing);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::NotFound.is_terminal());
        assert!(TaskStatus::Invalid.is_terminal());
    }
}
