//! Unified error types for the dual-store consistency layer.

use crate::store::StoreRole;
use crate::tables::Table;
use serde::Serialize;
use thiserror::Error;

/// Main error type for dual-write, verification and monitoring operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DualDbError {
    /// An attempt exceeded its per-attempt deadline.
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The underlying store rejected the call.
    #[error("{role} store error during '{operation}': {message}")]
    Store {
        role: StoreRole,
        operation: String,
        message: String,
    },

    /// A record that was required for a resync could not be found.
    #[error("Record '{id}' not found in table '{table}'")]
    NotFound { table: Table, id: String },

    /// A single table's sync verification failed.
    #[error("Sync check failed for table '{table}': {message}")]
    SyncCheck { table: Table, message: String },

    /// An alert channel failed to accept an alert. Always swallowed by the
    /// monitor; only visible in logs.
    #[error("Alert dispatch failed: {0}")]
    AlertDispatch(String),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DualDbError {
    /// Short machine-readable kind, used as a metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Store { .. } => "store",
            Self::NotFound { .. } => "not_found",
            Self::SyncCheck { .. } => "sync_check",
            Self::AlertDispatch(_) => "alert_dispatch",
            Self::Config(_) => "config",
        }
    }

    /// Convenience constructor for store-side failures.
    pub fn store(role: StoreRole, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            role,
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl Serialize for DualDbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for all dual-store operations.
pub type DbResult<T> = Result<T, DualDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DualDbError::Timeout {
            operation: "create".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "Operation 'create' timed out after 5000ms");
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_store_error_carries_role() {
        let err = DualDbError::store(StoreRole::Backup, "upsert", "connection refused");
        assert!(err.to_string().contains("backup"));
        assert!(err.to_string().contains("upsert"));
        assert_eq!(err.kind(), "store");
    }
}
