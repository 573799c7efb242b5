//! Human-readable messages for step and terminal events.
//!
//! Everything here is a pure function of its input: identical payloads
//! always produce identical text, which the deduplicator's content guard
//! relies on. Missing fields are left out of the message, never rendered
//! as blanks.

pub mod completion;
pub mod steps;

pub use completion::{failure_message, invalid_message, not_found_message, success_message};
pub use steps::format_step;

use serde_json::Value;

/// First of `keys` holding a non-empty string or a number, as text.
pub(crate) fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First of `keys` holding an array (its length) or a non-negative integer.
pub(crate) fn count_field(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::Array(items) => Some(items.len() as u64),
        Value::Number(n) => n.as_u64(),
        _ => None,
    })
}

/// First of `keys` holding a non-empty array.
pub(crate) fn array_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter()
        .find_map(|key| value.get(key)?.as_array().filter(|items| !items.is_empty()))
}

pub(crate) fn pluralize(count: u64, singular: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

/// `weather_check` / `weather-check` -> `Weather Check`.
pub(crate) fn title_case(id: &str) -> String {
    id.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
