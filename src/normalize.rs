//! Status normalizer: flattens heterogeneous snapshot payloads.
//!
//! The task-status service does not commit to one payload shape. Across
//! polls the result may arrive as:
//! - a JSON-encoded string under `data`
//! - an object nested under `fullResult.result` (or `fullResult` itself)
//! - the canonical object directly
//!
//! Shape resolution lives here and nowhere else. Nothing in this module
//! fails: unparsable strings are passed through unchanged.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::task::{StepId, StepResult, TaskStatus};

/// Which extraction attempt produced the canonical payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    EncodedData,
    NestedResult,
    NestedFullResult,
    Canonical,
}

/// Canonical view of one snapshot. Recomputed on every accepted poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub status: TaskStatus,
    /// Keyed by step id; iteration follows the canonical step order.
    pub steps: BTreeMap<StepId, StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The resolved payload the steps were read from.
    pub result: Value,
    pub shape: PayloadShape,
}

impl WorkflowSnapshot {
    pub fn step(&self, id: &StepId) -> Option<&StepResult> {
        self.steps.get(id)
    }
}

type Attempt = fn(&Value) -> Option<(PayloadShape, Value)>;

/// Extraction attempts in precedence order.
const ATTEMPTS: &[Attempt] = &[from_encoded_data, from_full_result];

/// Build the canonical snapshot for `status` and the raw payload.
///
/// `reported_error` is the error field of the status response; it takes
/// precedence over an error embedded in the payload.
pub fn normalize(status: TaskStatus, raw: &Value, reported_error: Option<&str>) -> WorkflowSnapshot {
    let (shape, result) = resolve_payload(raw);
    let steps = extract_steps(&result);
    let error = reported_error
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .or_else(|| embedded_error(&result));

    WorkflowSnapshot {
        status,
        steps,
        error,
        result,
        shape,
    }
}

/// Resolve the canonical payload, trying each known shape in order.
pub fn resolve_payload(raw: &Value) -> (PayloadShape, Value) {
    let root = decode_soft(raw);
    ATTEMPTS
        .iter()
        .find_map(|attempt| attempt(&root))
        .unwrap_or((PayloadShape::Canonical, root))
}

fn from_encoded_data(root: &Value) -> Option<(PayloadShape, Value)> {
    let encoded = root.get("data")?.as_str()?;
    match serde_json::from_str::<Value>(encoded) {
        Ok(parsed) => Some((PayloadShape::EncodedData, parsed)),
        Err(e) => {
            tracing::debug!("`data` is not valid JSON ({}), keeping payload as-is", e);
            None
        }
    }
}

fn from_full_result(root: &Value) -> Option<(PayloadShape, Value)> {
    let full = root.get("fullResult").or_else(|| root.get("full_result"))?;
    match full.get("result").filter(|r| !r.is_null()) {
        Some(result) => Some((PayloadShape::NestedResult, decode_soft(result))),
        None => Some((PayloadShape::NestedFullResult, decode_soft(full))),
    }
}

/// Parse a JSON-encoded string value; anything else comes back unchanged.
fn decode_soft(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(|v| v.is_object() || v.is_array())
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Steps come from an explicit `steps` object when there is one. Otherwise
/// top-level keys naming a known step are taken, so unrelated result keys
/// (`flights`, `hotels`, ...) are never mistaken for steps.
fn extract_steps(result: &Value) -> BTreeMap<StepId, StepResult> {
    let mut steps = BTreeMap::new();

    if let Some(Value::Object(map)) = result.get("steps").map(decode_soft).as_ref() {
        for (key, payload) in map {
            insert_step(&mut steps, StepId::parse(key), payload);
        }
        return steps;
    }

    if let Value::Object(map) = result {
        for (key, payload) in map {
            let id = StepId::parse(key);
            if id.is_known() {
                insert_step(&mut steps, id, payload);
            }
        }
    }

    steps
}

fn insert_step(steps: &mut BTreeMap<StepId, StepResult>, id: StepId, payload: &Value) {
    // A null entry is a placeholder for a step that has not run yet.
    if payload.is_null() {
        return;
    }
    steps
        .entry(id.clone())
        .or_insert_with(|| StepResult::new(id, decode_soft(payload)));
}

fn embedded_error(result: &Value) -> Option<String> {
    error_message(result.get("error")?)
}

/// Text of an error value: a plain string or an object with `message`.
pub(crate) fn error_message(error: &Value) -> Option<String> {
    let message = match error {
        Value::String(s) => s.as_str(),
        Value::Object(_) => error.get("message")?.as_str()?,
        _ => return None,
    };
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}
