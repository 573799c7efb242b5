//! Step-completed messages.

use serde_json::Value;

use super::{count_field, pluralize, text_field, title_case};
use crate::task::StepId;

/// Message for a completed step.
pub fn format_step(step: &StepId, payload: &Value) -> String {
    match step {
        StepId::Planning => planning(payload),
        StepId::Research => research(payload),
        StepId::ExternalSearch => external_search(payload),
        StepId::Compilation => compilation(payload),
        StepId::Unknown(id) => format!("{} completed.", title_case(id)),
    }
}

fn planning(payload: &Value) -> String {
    let mut msg = String::from("Trip plan ready");
    if let Some(destination) = text_field(payload, &["destination", "city", "location"]) {
        msg.push_str(&format!(" for {}", destination));
    }
    if let Some(duration) = duration(payload) {
        msg.push_str(&format!(" ({})", duration));
    }
    msg.push('.');
    if let Some(travelers) = text_field(payload, &["travelers", "travellers", "people"]) {
        msg.push_str(&format!(" Travelers: {}.", travelers));
    }
    if let Some(budget) = text_field(payload, &["budget"]) {
        msg.push_str(&format!(" Budget: {}.", budget));
    }
    msg
}

/// Numeric durations are days; free text is kept as written.
fn duration(payload: &Value) -> Option<String> {
    ["duration", "duration_days", "days"]
        .iter()
        .find_map(|key| match payload.get(key)? {
            Value::Number(n) => n.as_u64().map(|days| pluralize(days, "day")),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
}

fn research(payload: &Value) -> String {
    let mut msg = String::from("Research complete");
    if let Some(topic) = text_field(payload, &["destination", "topic", "query"]) {
        msg.push_str(&format!(" on {}", topic));
    }
    msg.push('.');
    if let Some(sources) = count_field(payload, &["sources", "source_count"]) {
        msg.push_str(&format!(" Reviewed {}.", pluralize(sources, "source")));
    }
    if let Some(highlights) = count_field(payload, &["highlights", "findings", "key_points"]) {
        msg.push_str(&format!(" Noted {}.", pluralize(highlights, "highlight")));
    }
    msg
}

fn external_search(payload: &Value) -> String {
    let mut found = Vec::new();
    if let Some(flights) = count_field(payload, &["flights"]) {
        found.push(pluralize(flights, "flight option"));
    }
    if let Some(hotels) = count_field(payload, &["hotels"]) {
        found.push(pluralize(hotels, "hotel option"));
    }
    if let Some(results) = count_field(payload, &["results", "result_count", "total_results"]) {
        found.push(pluralize(results, "search result"));
    }

    if found.is_empty() {
        "External search complete.".to_string()
    } else {
        format!("External search complete: found {}.", found.join(", "))
    }
}

fn compilation(payload: &Value) -> String {
    let mut msg = String::from("Itinerary compiled");
    if let Some(title) = text_field(payload, &["title", "name"]) {
        msg.push_str(&format!(": {}", title));
    }
    msg.push('.');
    if let Some(days) = count_field(payload, &["days", "daily_plan"]) {
        msg.push_str(&format!(" Covers {}.", pluralize(days, "day")));
    }
    if let Some(sections) = count_field(payload, &["sections"]) {
        msg.push_str(&format!(" Includes {}.", pluralize(sections, "section")));
    }
    msg
}
