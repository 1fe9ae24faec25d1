//! Configuration for the dual-write manager and the alerting pipeline.

use crate::error::{DbResult, DualDbError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for dual-write behavior. Immutable after manager
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualWriteConfig {
    /// Retries beyond the first attempt for primary writes (default: 2)
    pub primary_retries: u32,
    /// Retries beyond the first attempt for backup writes (default: 1)
    pub backup_retries: u32,
    /// Per-attempt timeout for primary writes in milliseconds (default: 5000)
    pub primary_timeout_ms: u64,
    /// Per-attempt timeout for backup writes in milliseconds (default: 3000)
    pub backup_timeout_ms: u64,
    /// Whether a backup failure fails the whole call (default: false).
    /// The primary write is never rolled back either way.
    pub fail_on_backup_error: bool,
    /// Whether backup writes happen at all (default: true)
    pub enable_sync: bool,
}

impl Default for DualWriteConfig {
    fn default() -> Self {
        Self {
            primary_retries: 2,
            backup_retries: 1,
            primary_timeout_ms: 5000,
            backup_timeout_ms: 3000,
            fail_on_backup_error: false,
            enable_sync: true,
        }
    }
}

impl DualWriteConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn backup_timeout(&self) -> Duration {
        Duration::from_millis(self.backup_timeout_ms)
    }

    /// Reject configurations the executor cannot honor.
    pub fn validate(&self) -> DbResult<()> {
        if self.primary_timeout_ms == 0 {
            return Err(DualDbError::Config(
                "primary_timeout_ms must be positive".to_string(),
            ));
        }
        if self.backup_timeout_ms == 0 {
            return Err(DualDbError::Config(
                "backup_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Alert thresholds evaluated by the database monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Maximum tolerated failure rate in percent, 0-100 (default: 10.0)
    pub max_failure_rate: f64,
    /// Maximum tolerated single-operation latency in ms (default: 1000)
    pub max_latency_ms: u64,
    /// Maximum tolerated per-table record-count gap (default: 10)
    pub max_sync_gap: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: 10.0,
            max_latency_ms: 1000,
            max_sync_gap: 10,
        }
    }
}

/// Alert channel configuration. Any subset of channels may be configured;
/// an unconfigured channel is simply skipped during dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Master switch for alert dispatch (alerts are still logged when off)
    pub enabled: bool,
    /// Plain JSON POST endpoint
    pub webhook_url: Option<String>,
    /// Slack incoming-webhook endpoint (block-based payload)
    pub slack_webhook_url: Option<String>,
    /// Email recipient placeholder; dispatch is not implemented, only logged
    pub email: Option<String>,
    #[serde(default)]
    pub thresholds: AlertThresholds,
}

impl AlertConfig {
    /// Alerting off, no channels, default thresholds.
    pub fn disabled() -> Self {
        Self::default()
    }
}
