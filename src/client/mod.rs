//! Clients for the two remote collaborators.
//!
//! - task-status query: returns the whole current state of a task
//! - instruction submission: sends a follow-up instruction for a task
//!
//! `TaskApi` is the seam the scheduler talks to; `HttpTaskApi` is the
//! reqwest implementation.

mod error;
mod http;

pub use error::{classify_http_status, ApiError, ApiErrorKind};
pub use http::HttpTaskApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::error_message;
use crate::task::{TaskId, TaskRecord};

/// Response envelope shared by both services.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    /// A string or an object with `message`.
    pub error: Option<Value>,
}

/// Follow-up instruction for a running or finished task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionRequest {
    pub task_id: TaskId,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Remote task services.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Fetch the current state of a task.
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskRecord, ApiError>;

    /// Submit a follow-up instruction. `Ok` means the service accepted it.
    async fn submit_instruction(&self, request: &InstructionRequest) -> Result<(), ApiError>;
}

impl<T> Envelope<T> {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().and_then(error_message)
    }

    /// Unwrap a successful envelope, turning `success: false` into an error.
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::rejected(
                self.error_message()
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::parse_error("successful response without data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success() {
        let envelope: Envelope<TaskRecord> = serde_json::from_value(json!({
            "success": true,
            "data": {"status": "processing", "result": {"steps": {}}, "original_request": "Plan Rome"}
        }))
        .unwrap();
        let record = envelope.into_data().unwrap();
        assert_eq!(record.status, "processing");
        assert_eq!(record.original_request.as_deref(), Some("Plan Rome"));
    }

    #[test]
    fn test_envelope_not_found_rejection() {
        let envelope: Envelope<TaskRecord> =
            serde_json::from_value(json!({"success": false, "error": "Task not found"})).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn test_envelope_object_error() {
        let envelope: Envelope<TaskRecord> = serde_json::from_value(
            json!({"success": false, "error": {"message": "Task not found"}}),
        )
        .unwrap();
        assert_eq!(envelope.error_message().as_deref(), Some("Task not found"));
        assert!(envelope.into_data().unwrap_err().is_terminal());
    }

    #[test]
    fn test_envelope_failed_record_with_object_error() {
        let envelope: Envelope<TaskRecord> = serde_json::from_value(json!({
            "success": true,
            "data": {"status": "failed", "error": {"message": "quota exceeded"}}
        }))
        .unwrap();
        let record = envelope.into_data().unwrap();
        assert_eq!(record.error_message().as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_envelope_missing_data_is_transient() {
        let envelope: Envelope<TaskRecord> =
            serde_json::from_value(json!({"success": true})).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::ParseError);
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_instruction_request_shape() {
        let request = InstructionRequest {
            task_id: TaskId::new("t1"),
            instruction: "Add a day in Sintra".to_string(),
            user_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"task_id": "t1", "instruction": "Add a day in Sintra"})
        );
    }
}
