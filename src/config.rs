//! Programmatic configuration for the realtime components.
//!
//! The HTTP adapter reads its own settings from the environment (`PORT` and
//! friends, see `main.rs`); the core components are configured through these
//! structs. Defaults match the platform contract, so `Default::default()` is
//! what production runs with.

use std::time::Duration;

use crate::errors::queue::QueueError;

/// Tuning knobs for the transaction queue dispatcher.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard cap on transactions in the `processing` partition at any instant.
    pub max_concurrent_processing: usize,
    /// Max items pulled from the pending heap per dispatcher tick.
    pub batch_size: usize,
    /// Base delay for the exponential backoff retry schedule.
    pub retry_delay_ms: u64,
    /// Ceiling for the backoff schedule.
    pub max_retry_delay_ms: u64,
    /// Each processing task is raced against this timeout.
    pub processing_timeout_ms: u64,
    /// Dispatcher tick interval.
    pub dispatch_interval_ms: u64,
    /// `max_retries` applied to items that don't specify their own.
    pub default_max_retries: u32,
    /// Completed (and cancelled) items older than this are evicted.
    pub completed_retention: Duration,
    /// How often the retention sweep runs.
    pub retention_sweep_interval: Duration,
    /// How long `shutdown` waits for in-flight processing to drain.
    pub shutdown_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processing: 10,
            batch_size: 10,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            processing_timeout_ms: 30_000,
            dispatch_interval_ms: 100,
            default_max_retries: 3,
            completed_retention: Duration::from_secs(24 * 60 * 60),
            retention_sweep_interval: Duration::from_secs(5 * 60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Checks the invariants callers rely on. Run on construction and again
    /// on every `update_configuration`.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_concurrent_processing < 1 {
            return Err(QueueError::InvalidConfig(
                "maxConcurrentProcessing must be at least 1",
            ));
        }
        if self.batch_size < 1 {
            return Err(QueueError::InvalidConfig("batchSize must be at least 1"));
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(QueueError::InvalidConfig(
                "maxRetryDelayMs must be >= retryDelayMs",
            ));
        }
        if self.processing_timeout_ms < 1_000 {
            return Err(QueueError::InvalidConfig(
                "processingTimeoutMs must be at least 1000",
            ));
        }
        if self.dispatch_interval_ms < 1 {
            return Err(QueueError::InvalidConfig(
                "dispatchIntervalMs must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Tuning knobs for the event bus dispatch loop.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Dispatch loop tick interval.
    pub dispatch_interval_ms: u64,
    /// Max events drained from the pending queue per tick.
    pub max_batch: usize,
    /// History entries older than this are evicted.
    pub history_retention: Duration,
    /// How often the history cleanup runs.
    pub cleanup_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 50,
            max_batch: 10,
            history_retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Tuning knobs for the connection hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Interval between `ping` frames broadcast to authenticated connections.
    pub heartbeat_interval: Duration,
    /// A connection is alive while `now - last_ping <= liveness_timeout`.
    pub liveness_timeout: Duration,
    /// The reaper removes connections whose last ping is older than this.
    pub reap_timeout: Duration,
    /// How often the reaper runs.
    pub reap_interval: Duration,
    /// Per-user offline buffer capacity; overflow drops the oldest entry.
    pub buffer_capacity: usize,
    /// Buffered events older than this are dropped.
    pub buffer_ttl: Duration,
    /// How often buffers are pruned.
    pub buffer_clean_interval: Duration,
    /// Subscriptions idle past this are reaped.
    pub stale_subscription_threshold: Duration,
    /// Single-use gateway tokens expire after this.
    pub token_ttl: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(30),
            reap_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(5 * 60),
            buffer_capacity: 100,
            buffer_ttl: Duration::from_secs(24 * 60 * 60),
            buffer_clean_interval: Duration::from_secs(5 * 60),
            stale_subscription_threshold: Duration::from_secs(60 * 60),
            token_ttl: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_config_is_valid() {
        QueueConfig::default().validate().expect("defaults must pass");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let cfg = QueueConfig {
            max_concurrent_processing: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_backoff_ceiling_below_base() {
        let cfg = QueueConfig {
            retry_delay_ms: 5_000,
            max_retry_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_sub_second_timeout() {
        let cfg = QueueConfig {
            processing_timeout_ms: 999,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
