use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::models::events::Event;

/// Comparison operators a subscription filter may use. Operators we don't
/// recognize still deserialize (as [Unknown](FilterOperator::Unknown)) and
/// simply never match, per the platform contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    #[serde(other, skip_serializing)]
    Unknown,
}

/// A structured predicate over an event, matched against the field at a
/// dotted path (`metadata.source`, `data.merchantId`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl SubscriptionFilter {
    /// Evaluates this filter against an event. Unresolvable paths evaluate
    /// to `false`, as do comparisons that fail coercion.
    pub fn matches(&self, event: &Event) -> bool {
        let Some(actual) = event.lookup(&self.field) else {
            return false;
        };

        match self.operator {
            FilterOperator::Equals => actual == self.value,
            FilterOperator::Contains => coerce_string(&actual).contains(&coerce_string(&self.value)),
            FilterOperator::StartsWith => {
                coerce_string(&actual).starts_with(&coerce_string(&self.value))
            }
            FilterOperator::EndsWith => {
                coerce_string(&actual).ends_with(&coerce_string(&self.value))
            }
            FilterOperator::GreaterThan => compare_numeric(&actual, &self.value, f64::gt),
            FilterOperator::LessThan => compare_numeric(&actual, &self.value, f64::lt),
            FilterOperator::Unknown => false,
        }
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_numeric(actual: &Value, expected: &Value, cmp: fn(&f64, &f64) -> bool) -> bool {
    match (coerce_f64(actual), coerce_f64(expected)) {
        (Some(a), Some(b)) => cmp(&a, &b),
        _ => false,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::events::EventType;

    fn event() -> Event {
        Event::new(
            EventType::TransactionCompleted,
            "u3",
            json!({ "merchantId": "m-1", "amount": 100, "memo": "payroll run 7" }),
        )
        .with_source("payroll")
    }

    fn filter(field: &str, operator: FilterOperator, value: Value) -> SubscriptionFilter {
        SubscriptionFilter {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn equals_is_strict() {
        assert!(filter("metadata.source", FilterOperator::Equals, json!("payroll")).matches(&event()));
        assert!(!filter("metadata.source", FilterOperator::Equals, json!("adhoc")).matches(&event()));
        // 100 and "100" are different values under strict equality
        assert!(!filter("data.amount", FilterOperator::Equals, json!("100")).matches(&event()));
    }

    #[test]
    fn substring_operators_coerce_to_strings() {
        assert!(filter("data.memo", FilterOperator::Contains, json!("run")).matches(&event()));
        assert!(filter("data.memo", FilterOperator::StartsWith, json!("payroll")).matches(&event()));
        assert!(filter("data.memo", FilterOperator::EndsWith, json!("7")).matches(&event()));
        assert!(filter("data.amount", FilterOperator::Contains, json!(10)).matches(&event()));
    }

    #[test]
    fn numeric_operators_coerce_or_fail() {
        assert!(filter("data.amount", FilterOperator::GreaterThan, json!(50)).matches(&event()));
        assert!(filter("data.amount", FilterOperator::LessThan, json!("200")).matches(&event()));
        // non-numeric comparand -> false, never an error
        assert!(!filter("data.memo", FilterOperator::GreaterThan, json!(1)).matches(&event()));
    }

    #[test]
    fn unresolved_paths_never_match() {
        assert!(!filter("data.absent", FilterOperator::Equals, json!(null)).matches(&event()));
    }

    #[test]
    fn unknown_operators_deserialize_and_never_match() {
        let parsed: SubscriptionFilter = serde_json::from_value(json!({
            "field": "metadata.source",
            "operator": "regexMatch",
            "value": ".*"
        }))
        .expect("unknown operators must not be a deserialization error");

        assert_eq!(parsed.operator, FilterOperator::Unknown);
        assert!(!parsed.matches(&event()));
    }
}
