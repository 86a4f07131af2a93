use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Scheduling priority for queued work. Higher scores dispatch first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TransactionPriority {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A unit of financial work admitted to the transaction queue. Fields mutate
/// only through the documented lifecycle transitions driven by the queue
/// itself; callers only ever see snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTransaction {
    pub id: String,
    pub user_id: String,
    /// Opaque payload handed to every registered processor.
    pub transaction_data: Value,
    pub priority: TransactionPriority,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: TransactionStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl QueuedTransaction {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        transaction_data: Value,
        priority: TransactionPriority,
        max_retries: u32,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            transaction_data,
            priority,
            retry_count: 0,
            max_retries,
            status: TransactionStatus::Pending,
            scheduled_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            error_message: None,
            metadata: Value::Null,
        }
    }
}
