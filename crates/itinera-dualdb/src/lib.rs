//! # Itinera Dual-Store Consistency Layer
//!
//! Writes every mutation to two independent datastores (a primary and a
//! backup), tolerates partial failure between them, verifies they stay in
//! sync, and raises alerts when they drift or degrade.
//!
//! ## Architecture
//!
//! ```text
//! itinera-dualdb/src/
//! ├── retry.rs      # Bounded retries + per-attempt timeout racing
//! ├── manager.rs    # DualWriteManager: asymmetric primary/backup writes
//! ├── verify.rs     # SyncVerifier: count + id-set reconciliation
//! ├── monitor/      # DatabaseMonitor: metric window, threshold alerts
//! └── store/        # RecordStore trait + in-memory backend
//! ```
//!
//! The failure policy is asymmetric by design: a primary failure is fatal to
//! the call, a backup failure puts it into degraded mode. Drift between the
//! stores is observable through the verifier and the monitor, never through
//! a write's own response (unless `fail_on_backup_error` is set).
//!
//! This crate guarantees primary consistency and best-effort backup
//! mirroring with observable drift. It is not a replication protocol: no
//! conflict-free merge, no quorum reads, no two-phase commit.
//!
//! ## Usage
//!
//! ```no_run
//! use itinera_dualdb::{
//!     AlertConfig, DatabaseMonitor, DualWriteConfig, DualWriteManager, MemoryStore,
//!     StoreRecord, StoreRole, SyncVerifier, Table,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> itinera_dualdb::DbResult<()> {
//! let primary = Arc::new(MemoryStore::new(StoreRole::Primary));
//! let backup = Arc::new(MemoryStore::new(StoreRole::Backup));
//!
//! let manager = DualWriteManager::new(
//!     primary.clone(),
//!     backup.clone(),
//!     DualWriteConfig::default(),
//! )?;
//! let monitor = DatabaseMonitor::new(AlertConfig::default());
//!
//! let result = manager
//!     .create(Table::Trip, StoreRecord::new(serde_json::json!({"title": "Lisbon"})))
//!     .await?;
//! monitor.record_dual_write_result("create", &result).await;
//!
//! let verifier = SyncVerifier::new(primary, backup);
//! let status = verifier.verify_sync_status().await;
//! monitor.record_sync_status(&status).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod retry;
pub mod store;
pub mod tables;
pub mod verify;

// Re-export commonly used types
pub use config::{AlertConfig, AlertThresholds, DualWriteConfig};
pub use error::{DbResult, DualDbError};
pub use manager::{BackupOutcome, DualWriteManager, DualWriteResult, HealthCheckStatus};
pub use monitor::{Alert, AlertSeverity, AlertType, DatabaseMonitor, MetricPoint};
pub use retry::execute_with_retry;
pub use store::{
    MemoryStore, Query, RecordKey, RecordStore, StoreRecord, StoreRole, WriteOp,
};
pub use tables::Table;
pub use verify::{
    ResyncOutcome, StoreHealth, StoreHealthReport, SyncGaps, SyncReport, SyncStatus, SyncVerifier,
};
