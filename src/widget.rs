//! Booking widget extraction from the external-search step.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::task::{StepId, StepResult};

/// Keys that may hold the bookable-offer collection, in lookup order.
const OFFER_KEYS: &[&str] = &["offers", "bookings", "booking_options"];

/// Bookable-offer records from the external-search step, unchanged.
///
/// A missing step or collection is not an error; it yields an empty list.
pub fn extract_widgets(steps: &BTreeMap<StepId, StepResult>) -> Vec<Value> {
    let Some(search) = steps.get(&StepId::ExternalSearch) else {
        return Vec::new();
    };
    OFFER_KEYS
        .iter()
        .find_map(|key| search.payload.get(key)?.as_array())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn steps_with(id: StepId, payload: Value) -> BTreeMap<StepId, StepResult> {
        let mut steps = BTreeMap::new();
        steps.insert(id.clone(), StepResult::new(id, payload));
        steps
    }

    #[test]
    fn test_offers_returned_unchanged() {
        let offers = json!([{"type": "hotel", "name": "Casa", "url": "https://example.test/b/1"}]);
        let steps = steps_with(StepId::ExternalSearch, json!({"offers": offers.clone()}));
        assert_eq!(Value::Array(extract_widgets(&steps)), offers);
    }

    #[test]
    fn test_missing_step_or_collection_is_empty() {
        assert!(extract_widgets(&BTreeMap::new()).is_empty());

        let steps = steps_with(StepId::ExternalSearch, json!({"offers": "n/a"}));
        assert!(extract_widgets(&steps).is_empty());

        let steps = steps_with(StepId::Research, json!({"offers": [1, 2]}));
        assert!(extract_widgets(&steps).is_empty());
    }

    #[test]
    fn test_fallback_key() {
        let steps = steps_with(StepId::ExternalSearch, json!({"bookings": [{"id": 1}]}));
        assert_eq!(extract_widgets(&steps).len(), 1);
    }
}
