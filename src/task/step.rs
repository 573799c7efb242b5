use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of one step within a task.
///
/// Variant order is the canonical declared step order; the derived `Ord`
/// is what step events are emitted in, so output never depends on the key
/// order of a snapshot. Unknown ids sort after all known ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StepId {
    Planning,
    Research,
    ExternalSearch,
    Compilation,
    Unknown(String),
}

impl StepId {
    /// Parse a step key from a snapshot. Accepts `-` or `_` separators.
    pub fn parse(key: &str) -> Self {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "planning" | "plan" => Self::Planning,
            "research" => Self::Research,
            "external_search" | "search" => Self::ExternalSearch,
            "compilation" | "compile" => Self::Compilation,
            _ => Self::Unknown(key.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Planning => "planning",
            Self::Research => "research",
            Self::ExternalSearch => "external_search",
            Self::Compilation => "compilation",
            Self::Unknown(id) => id,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.as_str().to_string()
    }
}

/// Payload reported for one step. Opaque: only the formatters look inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub payload: Value,
}

impl StepResult {
    pub fn new(step_id: StepId, payload: Value) -> Self {
        Self { step_id, payload }
    }
}
