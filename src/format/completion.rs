//! Terminal messages: success summary, failure, not-found and invalid id.
//!
//! The success summary is assembled from sections in a fixed order:
//! narrative, top attractions, flight options, hotel options, and a closing
//! call to action. Consumers may rely on that order, not on punctuation.

use serde_json::Value;

use super::{array_field, text_field};
use crate::normalize::WorkflowSnapshot;
use crate::task::{StepId, TaskId};

const MAX_ATTRACTIONS: usize = 5;
const MAX_OFFERS: usize = 3;

pub const UNKNOWN_ERROR: &str = "Unknown error";

pub const ATTRACTIONS_HEADER: &str = "Top attractions:";
pub const FLIGHTS_HEADER: &str = "Flight options:";
pub const HOTELS_HEADER: &str = "Hotel options:";

const HEADLINE: &str = "Your task is complete.";
const CALL_TO_ACTION: &str =
    "Reply with any changes you would like and I will update the plan.";

const NARRATIVE_KEYS: &[&str] = &["narrative", "summary", "final_output", "output", "itinerary"];

/// Failure notice built from the snapshot's error.
pub fn failure_message(error: Option<&str>) -> String {
    let error = error
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(UNKNOWN_ERROR);
    format!("Task failed: {}", error)
}

pub fn not_found_message(task_id: &TaskId) -> String {
    format!(
        "Task {} was not found. It may have expired or been removed; progress tracking has stopped.",
        task_id
    )
}

pub fn invalid_message(task_id: &TaskId) -> String {
    format!(
        "Cannot track task {:?}: the task id is missing or invalid.",
        task_id.as_str()
    )
}

/// Success summary for a completed snapshot.
pub fn success_message(snapshot: &WorkflowSnapshot) -> String {
    let mut sections = Vec::new();

    match narrative(snapshot) {
        Some(text) => sections.push(text),
        None => sections.push(HEADLINE.to_string()),
    }

    if let Some(items) = section_items(snapshot, &["attractions", "top_attractions"]) {
        let lines: Vec<String> = items
            .iter()
            .filter_map(attraction_line)
            .take(MAX_ATTRACTIONS)
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line))
            .collect();
        push_section(&mut sections, ATTRACTIONS_HEADER, lines);
    }

    if let Some(items) = section_items(snapshot, &["flights", "flight_options"]) {
        let lines = offer_lines(items, &["airline", "carrier"]);
        push_section(&mut sections, FLIGHTS_HEADER, lines);
    }

    if let Some(items) = section_items(snapshot, &["hotels", "hotel_options"]) {
        let lines = offer_lines(items, &["hotel_name"]);
        push_section(&mut sections, HOTELS_HEADER, lines);
    }

    sections.push(CALL_TO_ACTION.to_string());
    sections.join("\n\n")
}

fn push_section(sections: &mut Vec<String>, header: &str, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    sections.push(format!("{}\n{}", header, lines.join("\n")));
}

/// Where section data is looked up, in order.
fn sources(snapshot: &WorkflowSnapshot) -> Vec<&Value> {
    let mut sources = vec![&snapshot.result];
    for step in [StepId::Compilation, StepId::ExternalSearch] {
        if let Some(result) = snapshot.step(&step) {
            sources.push(&result.payload);
        }
    }
    sources
}

fn narrative(snapshot: &WorkflowSnapshot) -> Option<String> {
    sources(snapshot).into_iter().find_map(|source| {
        NARRATIVE_KEYS.iter().find_map(|key| match source.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
    })
}

fn section_items<'a>(snapshot: &'a WorkflowSnapshot, keys: &[&str]) -> Option<&'a Vec<Value>> {
    sources(snapshot)
        .into_iter()
        .find_map(|source| array_field(source, keys))
}

fn attraction_line(item: &Value) -> Option<String> {
    if let Some(name) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(name.to_string());
    }
    let name = text_field(item, &["name", "title"])?;
    match text_field(item, &["rating"]) {
        Some(rating) => Some(format!("{} (rated {})", name, rating)),
        None => Some(name),
    }
}

fn offer_lines(items: &[Value], name_keys: &[&str]) -> Vec<String> {
    items
        .iter()
        .take(MAX_OFFERS)
        .enumerate()
        .map(|(i, item)| offer_line(item, i, name_keys))
        .collect()
}

/// One offer. Every sub-field is optional and omitted independently.
fn offer_line(item: &Value, index: usize, name_keys: &[&str]) -> String {
    let name = text_field(item, &["name", "title"])
        .or_else(|| text_field(item, name_keys))
        .or_else(|| item.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Option {}", index + 1));

    let mut parts = vec![name];
    if let Some(price) = price(item) {
        parts.push(price);
    }
    if let Some(rating) = text_field(item, &["rating", "stars"]) {
        parts.push(format!("rating {}", rating));
    }
    if let Some(reviews) = text_field(item, &["reviews", "review_count", "reviews_count"]) {
        parts.push(format!("{} reviews", reviews));
    }
    if let Some(address) = text_field(item, &["address", "location"]) {
        parts.push(address);
    }
    format!("- {}", parts.join(" | "))
}

fn price(item: &Value) -> Option<String> {
    let amount = text_field(item, &["price", "total_price", "cost"])?;
    match text_field(item, &["currency"]) {
        Some(currency) => Some(format!("{} {}", amount, currency)),
        None => Some(amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::task::TaskStatus;
    use serde_json::json;

    fn completed(raw: Value) -> WorkflowSnapshot {
        normalize(TaskStatus::Completed, &raw, None)
    }

    fn section<'a>(message: &'a str, header: &str) -> Vec<&'a str> {
        message
            .split("\n\n")
            .find(|s| s.starts_with(header))
            .map(|s| s.lines().skip(1).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(failure_message(Some("quota exceeded")), "Task failed: quota exceeded");
        assert_eq!(failure_message(None), "Task failed: Unknown error");
        assert_eq!(failure_message(Some("")), "Task failed: Unknown error");
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let snapshot = completed(json!({
            "hotels": [{"name": "Hotel A"}],
            "flights": [{"airline": "TAP"}],
            "attractions": ["Belem Tower"],
            "summary": "Five sunny days in Lisbon."
        }));
        let msg = success_message(&snapshot);

        let narrative = msg.find("Five sunny days").unwrap();
        let attractions = msg.find(ATTRACTIONS_HEADER).unwrap();
        let flights = msg.find(FLIGHTS_HEADER).unwrap();
        let hotels = msg.find(HOTELS_HEADER).unwrap();
        let cta = msg.find(CALL_TO_ACTION).unwrap();
        assert!(narrative < attractions);
        assert!(attractions < flights);
        assert!(flights < hotels);
        assert!(hotels < cta);
    }

    #[test]
    fn test_limits_per_section() {
        let attractions: Vec<Value> = (1..=8).map(|i| json!({"name": format!("Sight {}", i)})).collect();
        let hotels: Vec<Value> = (1..=6).map(|i| json!({"name": format!("Hotel {}", i)})).collect();
        let snapshot = completed(json!({"attractions": attractions, "hotels": hotels}));
        let msg = success_message(&snapshot);

        assert_eq!(section(&msg, ATTRACTIONS_HEADER).len(), 5);
        assert_eq!(section(&msg, HOTELS_HEADER).len(), 3);
        assert!(section(&msg, FLIGHTS_HEADER).is_empty());
    }

    #[test]
    fn test_offer_subfields_are_omitted_independently() {
        let snapshot = completed(json!({"hotels": [
            {"name": "Casa Azul", "price": 120, "currency": "EUR", "rating": 4.6, "reviews": 812, "address": "Rua Augusta 1"},
            {"name": "Hostel Verde"},
            {"rating": 3.9}
        ]}));
        let msg = success_message(&snapshot);
        let lines = section(&msg, HOTELS_HEADER);

        assert_eq!(
            lines[0],
            "- Casa Azul | 120 EUR | rating 4.6 | 812 reviews | Rua Augusta 1"
        );
        assert_eq!(lines[1], "- Hostel Verde");
        assert_eq!(lines[2], "- Option 3 | rating 3.9");
        assert!(!msg.contains("undefined"));
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let snapshot = completed(json!({"flights": [], "attractions": []}));
        let msg = success_message(&snapshot);
        assert!(msg.starts_with(HEADLINE));
        assert!(!msg.contains(FLIGHTS_HEADER));
        assert!(!msg.contains(ATTRACTIONS_HEADER));
        assert!(msg.ends_with(CALL_TO_ACTION));
    }

    #[test]
    fn test_section_data_from_steps() {
        let snapshot = completed(json!({"steps": {
            "compilation": {"summary": "Compiled plan."},
            "external_search": {"flights": [{"airline": "KLM", "price": "310"}]}
        }}));
        let msg = success_message(&snapshot);
        assert!(msg.starts_with("Compiled plan."));
        assert_eq!(section(&msg, FLIGHTS_HEADER), vec!["- KLM | 310"]);
    }

    #[test]
    fn test_not_found_and_invalid_messages() {
        let id = TaskId::new("abc");
        assert!(not_found_message(&id).contains("abc"));
        assert!(invalid_message(&TaskId::new("undefined")).contains("invalid"));
    }
}
