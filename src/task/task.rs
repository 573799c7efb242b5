//! The observed task and the identifier it is polled by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::TaskStatus;
use crate::normalize::error_message;

/// Opaque identifier of a remote task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether this id can be sent to the task-status service at all.
    ///
    /// Empty ids and the literal strings `undefined` and `null` (leaked
    /// placeholders from an unset value upstream) are rejected.
    pub fn is_valid(&self) -> bool {
        let trimmed = self.0.trim();
        !(trimmed.is_empty() || trimmed == "undefined" || trimmed == "null")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One task-status response body (`data` of a successful query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: String,
    #[serde(default)]
    pub result: Value,
    /// A string or an object with `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// RFC 3339 text or unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request: Option<String>,
}

impl TaskRecord {
    pub fn new(status: impl Into<String>, result: Value) -> Self {
        Self {
            status: status.into(),
            result,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Value::String(error.into()));
        self
    }

    /// Reported error text, if the record carries a usable one.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().and_then(error_message)
    }

    pub fn with_original_request(mut self, request: impl Into<String>) -> Self {
        self.original_request = Some(request.into());
        self
    }
}

/// A task as observed over one session.
///
/// Created by the first successful poll. Identity, original request and
/// creation time never change afterwards; status and raw result follow
/// each accepted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub original_request: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub raw_result: Value,
}

impl Task {
    pub fn from_record(task_id: TaskId, record: &TaskRecord) -> Self {
        Self {
            task_id,
            status: TaskStatus::from_wire(&record.status),
            original_request: record
                .original_request
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            created_at: record.created_at.as_ref().and_then(parse_timestamp),
            raw_result: record.result.clone(),
        }
    }

    /// Apply a later snapshot. Fields set once are kept.
    pub fn update(&mut self, record: &TaskRecord) {
        self.status = TaskStatus::from_wire(&record.status);
        self.raw_result = record.result.clone();
        if self.original_request.is_none() {
            self.original_request = record
                .original_request
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
        if self.created_at.is_none() {
            self.created_at = record.created_at.as_ref().and_then(parse_timestamp);
        }
    }
}

fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => DateTime::<Utc>::from_timestamp(n.as_i64()?, 0),
        _ => None,
    }
}
