use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Reserved sentinel for broadcast alerts. An event addressed to this user is
/// fanned out to every authenticated subscription listening for system alerts.
pub const SYSTEM_USER: &str = "system";

/// The closed set of domain event types the platform emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TransactionCreated,
    TransactionProcessing,
    TransactionCompleted,
    TransactionFailed,
    BalanceUpdated,
    CurrencyConverted,
    AccountCreated,
    ExchangeRateUpdated,
    SystemAlert,
    PerformanceMetric,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionCreated => "transaction_created",
            Self::TransactionProcessing => "transaction_processing",
            Self::TransactionCompleted => "transaction_completed",
            Self::TransactionFailed => "transaction_failed",
            Self::BalanceUpdated => "balance_updated",
            Self::CurrencyConverted => "currency_converted",
            Self::AccountCreated => "account_created",
            Self::ExchangeRateUpdated => "exchange_rate_updated",
            Self::SystemAlert => "system_alert",
            Self::PerformanceMetric => "performance_metric",
        }
    }

    /// The subset emitted by the transaction queue over an item's lifecycle.
    pub const fn is_transaction_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::TransactionCreated
                | Self::TransactionProcessing
                | Self::TransactionCompleted
                | Self::TransactionFailed
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = crate::errors::events::EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction_created" => Ok(Self::TransactionCreated),
            "transaction_processing" => Ok(Self::TransactionProcessing),
            "transaction_completed" => Ok(Self::TransactionCompleted),
            "transaction_failed" => Ok(Self::TransactionFailed),
            "balance_updated" => Ok(Self::BalanceUpdated),
            "currency_converted" => Ok(Self::CurrencyConverted),
            "account_created" => Ok(Self::AccountCreated),
            "exchange_rate_updated" => Ok(Self::ExchangeRateUpdated),
            "system_alert" => Ok(Self::SystemAlert),
            "performance_metric" => Ok(Self::PerformanceMetric),
            other => Err(crate::errors::events::EventError::InvalidEventType(
                other.to_string(),
            )),
        }
    }
}

/// Dispatch priority. Higher scores leave the bus first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl EventPriority {
    pub const fn score(&self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::str::FromStr for EventPriority {
    type Err = crate::errors::events::EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(crate::errors::events::EventError::InvalidPriority(
                other.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub source: String,
    pub version: String,
    pub priority: EventPriority,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            source: "remit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            priority: EventPriority::Medium,
            retryable: true,
            expires_at: None,
            tags: None,
        }
    }
}

/// An immutable domain event. Once constructed, no field mutates; the bus and
/// hub only ever clone these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub r#type: EventType,
    pub user_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub metadata: EventMetadata,
}

impl Event {
    pub fn new(r#type: EventType, user_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            r#type,
            user_id: user_id.into(),
            data,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4().to_string(),
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.metadata.expires_at = Some(expires_at);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.metadata.tags = Some(tags);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.metadata.retryable = retryable;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.metadata
            .expires_at
            .is_some_and(|expires| expires <= now)
    }

    pub fn is_system(&self) -> bool {
        self.user_id == SYSTEM_USER
    }

    /// Resolves a dotted field path against this event, for subscription
    /// filters. Top-level names use the wire casing (`userId`,
    /// `correlationId`); `data.*` descends into the payload and `metadata.*`
    /// into the metadata record. Unresolvable paths return [None].
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let head = parts.next()?;

        match head {
            "id" => leaf(parts, Value::String(self.id.to_string())),
            "type" => leaf(parts, Value::String(self.r#type.as_str().to_string())),
            "userId" => leaf(parts, Value::String(self.user_id.clone())),
            "timestamp" => leaf(parts, Value::String(self.timestamp.to_rfc3339())),
            "correlationId" => leaf(parts, Value::String(self.correlation_id.clone())),
            "data" => descend(&self.data, parts),
            "metadata" => self.lookup_metadata(parts),
            _ => None,
        }
    }

    fn lookup_metadata<'a>(&self, mut parts: impl Iterator<Item = &'a str>) -> Option<Value> {
        let field = parts.next()?;

        let value = match field {
            "source" => Value::String(self.metadata.source.clone()),
            "version" => Value::String(self.metadata.version.clone()),
            "priority" => Value::String(self.metadata.priority.as_str().to_string()),
            "retryable" => Value::Bool(self.metadata.retryable),
            "expiresAt" => Value::String(self.metadata.expires_at?.to_rfc3339()),
            "tags" => {
                let tags = self.metadata.tags.as_ref()?;
                Value::Array(tags.iter().cloned().map(Value::String).collect())
            }
            _ => return None,
        };

        leaf(parts, value)
    }
}

/// A resolved value is only valid if the path stops here.
fn leaf<'a>(mut rest: impl Iterator<Item = &'a str>, value: Value) -> Option<Value> {
    match rest.next() {
        Some(_) => None,
        None => Some(value),
    }
}

fn descend<'a>(root: &Value, parts: impl Iterator<Item = &'a str>) -> Option<Value> {
    let mut current = root;

    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    fn payroll_event() -> Event {
        Event::new(
            EventType::TransactionCompleted,
            "u1",
            json!({ "merchantId": "m-77", "amount": 12.5, "legs": ["debit", "credit"] }),
        )
        .with_source("payroll")
        .with_tags(vec!["batch".to_string()])
    }

    #[test]
    fn lookup_resolves_top_level_fields() {
        let event = payroll_event();

        assert_eq!(
            event.lookup("type"),
            Some(json!("transaction_completed")),
            "type should resolve to its wire name"
        );
        assert_eq!(event.lookup("userId"), Some(json!("u1")));
    }

    #[test]
    fn lookup_descends_into_data_and_metadata() {
        let event = payroll_event();

        assert_eq!(event.lookup("data.merchantId"), Some(json!("m-77")));
        assert_eq!(event.lookup("data.legs.1"), Some(json!("credit")));
        assert_eq!(event.lookup("metadata.source"), Some(json!("payroll")));
        assert_eq!(event.lookup("metadata.tags"), Some(json!(["batch"])));
    }

    #[test]
    fn lookup_rejects_bad_paths() {
        let event = payroll_event();

        assert_eq!(event.lookup("data.missing"), None);
        assert_eq!(event.lookup("metadata.expiresAt"), None, "unset optional");
        assert_eq!(event.lookup("userId.nested"), None, "leaf with a tail");
        assert_eq!(event.lookup("nonsense"), None);
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let event = payroll_event().with_expiry(now);

        assert!(event.expired_at(now));
        assert!(!event.expired_at(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn serializes_with_wire_casing() {
        let event = payroll_event();
        let value = serde_json::to_value(&event).expect("event must serialize");

        assert!(value.get("userId").is_some());
        assert!(value.get("correlationId").is_some());
        assert_eq!(value["metadata"]["retryable"], json!(true));
    }
}
