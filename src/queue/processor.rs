use async_trait::async_trait;

use crate::models::transactions::QueuedTransaction;

/// Error returned by a processor. The message ends up on the transaction's
/// `error_message` and in the `transaction_failed` event payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ProcessorError(pub String);

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A unit of business logic invoked for every transaction the queue
/// dispatches. Processors run sequentially per transaction and may be invoked
/// concurrently across transactions, so implementations must be safe to call
/// from multiple tasks.
///
/// Timeouts abandon the in-flight future rather than cancelling it, and
/// retries re-invoke from scratch. Processors must therefore be idempotent
/// with respect to a transaction id.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Stable name, used for unregistration and logging.
    fn name(&self) -> &str;

    async fn process(&self, transaction: &QueuedTransaction) -> Result<(), ProcessorError>;
}
