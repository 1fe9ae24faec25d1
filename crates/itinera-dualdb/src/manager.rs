//! Dual-write orchestration.
//!
//! Every mutation is written to the primary store first and, on confirmed
//! primary success, mirrored to the backup store. The failure policy is
//! asymmetric: primary failures are fatal to the call, backup failures put
//! the call into degraded mode (unless `fail_on_backup_error` is set).
//!
//! There is no two-phase commit. When `fail_on_backup_error` turns a backup
//! failure into a call failure, the already-committed primary write is NOT
//! rolled back; the caller sees an error for a mutation that exists in the
//! primary store.

use crate::config::DualWriteConfig;
use crate::error::{DbResult, DualDbError};
use crate::retry::execute_with_retry;
use crate::store::{Query, RecordStore, StoreRecord, StoreRole, WriteOp};
use crate::tables::Table;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened on the backup side of a dual write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// Backup mirroring is disabled (`enable_sync = false`); never attempted.
    Skipped,
    /// The backup write succeeded.
    Mirrored,
    /// The backup write failed after exhausting its retries.
    Degraded { error: DualDbError },
}

/// Per-call result of a dual write. A value of this type is only ever
/// produced after a confirmed primary success; primary failures surface as
/// errors instead.
#[derive(Debug, Clone, Serialize)]
pub struct DualWriteResult<T> {
    pub primary: T,
    pub backup: Option<T>,
    pub backup_outcome: BackupOutcome,
}

impl<T> DualWriteResult<T> {
    /// Always true for a returned result; present for symmetry with
    /// `backup_success` in metrics and dashboards.
    pub fn primary_success(&self) -> bool {
        true
    }

    pub fn backup_success(&self) -> bool {
        matches!(self.backup_outcome, BackupOutcome::Mirrored)
    }

    pub fn backup_error(&self) -> Option<&DualDbError> {
        match &self.backup_outcome {
            BackupOutcome::Degraded { error } => Some(error),
            _ => None,
        }
    }
}

/// Outcome of [`DualWriteManager::health_check`]. Never an error; a failing
/// store shows up as `false` plus an entry in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckStatus {
    pub primary: bool,
    pub backup: bool,
    pub errors: Vec<String>,
}

/// Orchestrates every mutating operation against both stores.
///
/// Constructed once per process with two long-lived store handles; holds no
/// mutable state beyond configuration.
pub struct DualWriteManager {
    primary: Arc<dyn RecordStore>,
    backup: Arc<dyn RecordStore>,
    config: DualWriteConfig,
}

impl DualWriteManager {
    pub fn new(
        primary: Arc<dyn RecordStore>,
        backup: Arc<dyn RecordStore>,
        config: DualWriteConfig,
    ) -> DbResult<Self> {
        config.validate()?;
        Ok(Self {
            primary,
            backup,
            config,
        })
    }

    pub fn config(&self) -> &DualWriteConfig {
        &self.config
    }

    /// Core dual-write algorithm: primary strictly first, backup only after
    /// confirmed primary success, each side through the retry executor.
    async fn execute_dual_write<T, FP, FutP, FB, FutB>(
        &self,
        operation: &str,
        primary_op: FP,
        backup_op: FB,
    ) -> DbResult<DualWriteResult<T>>
    where
        FP: Fn() -> FutP,
        FutP: Future<Output = DbResult<T>>,
        FB: Fn() -> FutB,
        FutB: Future<Output = DbResult<T>>,
    {
        // Primary failure is fatal: propagate, never attempt backup.
        let primary = execute_with_retry(
            operation,
            self.config.primary_retries,
            self.config.primary_timeout(),
            primary_op,
        )
        .await?;

        if !self.config.enable_sync {
            debug!("Backup sync disabled, skipping backup write for '{operation}'");
            return Ok(DualWriteResult {
                primary,
                backup: None,
                backup_outcome: BackupOutcome::Skipped,
            });
        }

        match execute_with_retry(
            operation,
            self.config.backup_retries,
            self.config.backup_timeout(),
            backup_op,
        )
        .await
        {
            Ok(backup) => Ok(DualWriteResult {
                primary,
                backup: Some(backup),
                backup_outcome: BackupOutcome::Mirrored,
            }),
            Err(error) => {
                warn!(
                    "Backup write failed for '{}' (primary committed, entering degraded mode): {}",
                    operation, error
                );
                if self.config.fail_on_backup_error {
                    // The primary write is not rolled back.
                    return Err(error);
                }
                Ok(DualWriteResult {
                    primary,
                    backup: None,
                    backup_outcome: BackupOutcome::Degraded { error },
                })
            }
        }
    }

    pub async fn create(
        &self,
        table: Table,
        record: StoreRecord,
    ) -> DbResult<DualWriteResult<StoreRecord>> {
        let primary = Arc::clone(&self.primary);
        let backup = Arc::clone(&self.backup);
        let backup_record = record.clone();
        self.execute_dual_write(
            "create",
            move || {
                let store = Arc::clone(&primary);
                let record = record.clone();
                async move { store.create(table, record).await }
            },
            move || {
                let store = Arc::clone(&backup);
                let record = backup_record.clone();
                async move { store.create(table, record).await }
            },
        )
        .await
    }

    pub async fn update(
        &self,
        table: Table,
        id: &str,
        patch: serde_json::Value,
    ) -> DbResult<DualWriteResult<StoreRecord>> {
        let primary = Arc::clone(&self.primary);
        let backup = Arc::clone(&self.backup);
        let id = id.to_string();
        let backup_id = id.clone();
        let backup_patch = patch.clone();
        self.execute_dual_write(
            "update",
            move || {
                let store = Arc::clone(&primary);
                let id = id.clone();
                let patch = patch.clone();
                async move { store.update(table, &id, patch).await }
            },
            move || {
                let store = Arc::clone(&backup);
                let id = backup_id.clone();
                let patch = backup_patch.clone();
                async move { store.update(table, &id, patch).await }
            },
        )
        .await
    }

    pub async fn delete(&self, table: Table, id: &str) -> DbResult<DualWriteResult<StoreRecord>> {
        let primary = Arc::clone(&self.primary);
        let backup = Arc::clone(&self.backup);
        let id = id.to_string();
        let backup_id = id.clone();
        self.execute_dual_write(
            "delete",
            move || {
                let store = Arc::clone(&primary);
                let id = id.clone();
                async move { store.delete(table, &id).await }
            },
            move || {
                let store = Arc::clone(&backup);
                let id = backup_id.clone();
                async move { store.delete(table, &id).await }
            },
        )
        .await
    }

    pub async fn upsert(
        &self,
        table: Table,
        record: StoreRecord,
    ) -> DbResult<DualWriteResult<StoreRecord>> {
        let primary = Arc::clone(&self.primary);
        let backup = Arc::clone(&self.backup);
        let backup_record = record.clone();
        self.execute_dual_write(
            "upsert",
            move || {
                let store = Arc::clone(&primary);
                let record = record.clone();
                async move { store.upsert(table, record).await }
            },
            move || {
                let store = Arc::clone(&backup);
                let record = backup_record.clone();
                async move { store.upsert(table, record).await }
            },
        )
        .await
    }

    /// Applies one typed batch inside each store's native transaction
    /// primitive, primary first.
    pub async fn transaction(
        &self,
        ops: &[WriteOp],
    ) -> DbResult<DualWriteResult<Vec<StoreRecord>>> {
        let primary = Arc::clone(&self.primary);
        let backup = Arc::clone(&self.backup);
        let primary_ops: Vec<WriteOp> = ops.to_vec();
        let backup_ops: Vec<WriteOp> = ops.to_vec();
        self.execute_dual_write(
            "transaction",
            move || {
                let store = Arc::clone(&primary);
                let ops = primary_ops.clone();
                async move { store.transaction(&ops).await }
            },
            move || {
                let store = Arc::clone(&backup);
                let ops = backup_ops.clone();
                async move { store.transaction(&ops).await }
            },
        )
        .await
    }

    // Reads go straight to the primary with no retry wrapper; they are cheap
    // to re-issue at the application layer and are not mirrored.

    pub async fn find_unique(&self, table: Table, id: &str) -> DbResult<Option<StoreRecord>> {
        self.primary.find_unique(table, id).await
    }

    pub async fn find_many(&self, table: Table, query: &Query) -> DbResult<Vec<StoreRecord>> {
        self.primary.find_many(table, query).await
    }

    pub async fn find_first(&self, table: Table, query: &Query) -> DbResult<Option<StoreRecord>> {
        self.primary.find_first(table, query).await
    }

    pub async fn count(&self, table: Table, filter: Option<&serde_json::Value>) -> DbResult<u64> {
        self.primary.count(table, filter).await
    }

    /// Pings both stores independently. Never errors.
    pub async fn health_check(&self) -> HealthCheckStatus {
        let mut errors = Vec::new();

        let primary = match self.primary.ping().await {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("primary: {e}"));
                false
            }
        };
        let backup = match self.backup.ping().await {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("backup: {e}"));
                false
            }
        };

        HealthCheckStatus {
            primary,
            backup,
            errors,
        }
    }

    /// Best-effort disconnect of both stores; failures are logged only.
    pub async fn disconnect(&self) {
        for (role, store) in [
            (StoreRole::Primary, &self.primary),
            (StoreRole::Backup, &self.backup),
        ] {
            if let Err(e) = store.disconnect().await {
                warn!("Failed to disconnect {role} store: {e}");
            }
        }
        info!("Dual-write manager disconnected from both stores");
    }
}
