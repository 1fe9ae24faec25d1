//! Point-in-time reconciliation between the two stores.
//!
//! Verification is observational: it compares row counts and samples recent
//! id sets, but never mutates either store except through the explicit
//! [`SyncVerifier::sync_missing_records`] resync path.

use crate::error::{DbResult, DualDbError};
use crate::store::{Query, RecordKey, RecordStore};
use crate::tables::Table;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Per-table reconciliation result.
///
/// Invariants: `difference == |primary_count - backup_count|` and
/// `in_sync == (difference == 0)`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub table: Table,
    pub primary_count: u64,
    pub backup_count: u64,
    pub difference: u64,
    pub in_sync: bool,
    pub last_sync_check: DateTime<Utc>,
}

/// Aggregate verification outcome. `overall` is true iff every report is in
/// sync and no table check failed.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub overall: bool,
    pub reports: Vec<SyncReport>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Records present on one side but missing on the other, within the sampled
/// window.
#[derive(Debug, Clone, Serialize)]
pub struct SyncGaps {
    pub missing_in_backup: Vec<RecordKey>,
    pub missing_in_primary: Vec<RecordKey>,
}

/// Outcome of a best-effort resync pass.
#[derive(Debug, Clone, Serialize)]
pub struct ResyncOutcome {
    pub synced: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Per-store health with measured wall-clock latency.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub healthy: bool,
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealthReport {
    pub primary: StoreHealth,
    pub backup: StoreHealth,
}

/// Cross-store sync verification over the fixed [`Table::ALL`] set.
///
/// Stateless; constructed once with the two long-lived store handles.
pub struct SyncVerifier {
    primary: Arc<dyn RecordStore>,
    backup: Arc<dyn RecordStore>,
}

impl SyncVerifier {
    pub fn new(primary: Arc<dyn RecordStore>, backup: Arc<dyn RecordStore>) -> Self {
        Self { primary, backup }
    }

    /// Compares row counts for every mirrored table.
    ///
    /// A failing table is recorded in `errors` and must not block
    /// verification of the remaining tables.
    pub async fn verify_sync_status(&self) -> SyncStatus {
        let mut reports = Vec::with_capacity(Table::ALL.len());
        let mut errors = Vec::new();

        for &table in Table::ALL {
            match self.check_table(table).await {
                Ok(report) => {
                    if !report.in_sync {
                        warn!(
                            "Table '{}' out of sync: primary={} backup={} (gap {})",
                            table, report.primary_count, report.backup_count, report.difference
                        );
                    }
                    reports.push(report);
                }
                Err(e) => {
                    let wrapped = DualDbError::SyncCheck {
                        table,
                        message: e.to_string(),
                    };
                    warn!("{}", wrapped);
                    errors.push(wrapped.to_string());
                }
            }
        }

        let overall = errors.is_empty() && reports.iter().all(|r| r.in_sync);
        info!(
            "Sync verification complete: overall={} ({} tables, {} errors)",
            overall,
            reports.len(),
            errors.len()
        );

        SyncStatus {
            overall,
            reports,
            errors,
            timestamp: Utc::now(),
        }
    }

    async fn check_table(&self, table: Table) -> DbResult<SyncReport> {
        let primary_count = self.primary.count(table, None).await?;
        let backup_count = self.backup.count(table, None).await?;
        let difference = primary_count.abs_diff(backup_count);

        Ok(SyncReport {
            table,
            primary_count,
            backup_count,
            difference,
            in_sync: difference == 0,
            last_sync_check: Utc::now(),
        })
    }

    /// Diffs the id sets of the newest `limit` records on each side.
    ///
    /// This is a bounded, sampled detector: gaps older than the sampled
    /// window are invisible to it. An exhaustive diff would change the
    /// performance profile materially and is deliberately not offered here.
    pub async fn find_sync_gaps(&self, table: Table, limit: usize) -> DbResult<SyncGaps> {
        let query = Query::newest(limit);
        let primary_keys: Vec<RecordKey> = self
            .primary
            .find_many(table, &query)
            .await?
            .iter()
            .map(|r| r.key())
            .collect();
        let backup_keys: Vec<RecordKey> = self
            .backup
            .find_many(table, &query)
            .await?
            .iter()
            .map(|r| r.key())
            .collect();

        let primary_ids: HashSet<&str> = primary_keys.iter().map(|k| k.id.as_str()).collect();
        let backup_ids: HashSet<&str> = backup_keys.iter().map(|k| k.id.as_str()).collect();

        let missing_in_backup = primary_keys
            .iter()
            .filter(|k| !backup_ids.contains(k.id.as_str()))
            .cloned()
            .collect();
        let missing_in_primary = backup_keys
            .iter()
            .filter(|k| !primary_ids.contains(k.id.as_str()))
            .cloned()
            .collect();

        Ok(SyncGaps {
            missing_in_backup,
            missing_in_primary,
        })
    }

    /// Re-copies specific records from primary to backup by upsert.
    ///
    /// Best-effort: individual failures are counted and collected, never
    /// abort the pass.
    pub async fn sync_missing_records(&self, table: Table, ids: &[String]) -> ResyncOutcome {
        let mut outcome = ResyncOutcome {
            synced: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for id in ids {
            let result = async {
                let record = self
                    .primary
                    .find_unique(table, id)
                    .await?
                    .ok_or_else(|| DualDbError::NotFound {
                        table,
                        id: id.clone(),
                    })?;
                self.backup.upsert(table, record).await
            }
            .await;

            match result {
                Ok(_) => outcome.synced += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(format!("{id}: {e}"));
                }
            }
        }

        info!(
            "Resync of table '{}': {} synced, {} failed",
            table, outcome.synced, outcome.failed
        );
        outcome
    }

    /// Renders a fresh verification pass as a Markdown report with a
    /// recommendations section when anything is out of sync.
    pub async fn generate_sync_report(&self) -> String {
        let status = self.verify_sync_status().await;
        let mut out = String::new();

        out.push_str("# Database Sync Report\n\n");
        out.push_str(&format!(
            "Generated: {}\n\nOverall status: {}\n\n",
            status.timestamp.to_rfc3339(),
            if status.overall {
                "✅ IN SYNC"
            } else {
                "⚠️ OUT OF SYNC"
            }
        ));

        out.push_str("| Table | Primary | Backup | Difference | Status |\n");
        out.push_str("|-------|---------|--------|------------|--------|\n");
        for report in &status.reports {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                report.table,
                report.primary_count,
                report.backup_count,
                report.difference,
                if report.in_sync { "✅" } else { "⚠️" }
            ));
        }

        if !status.errors.is_empty() {
            out.push_str("\n## Errors\n\n");
            for error in &status.errors {
                out.push_str(&format!("- {error}\n"));
            }
        }

        if !status.overall {
            out.push_str("\n## Recommendations\n\n");
            out.push_str("- Run `find_sync_gaps` on each out-of-sync table to identify missing records\n");
            out.push_str("- Resync missing records with `sync_missing_records`\n");
            out.push_str("- Check backup store connectivity and recent dual-write alerts\n");
        }

        out
    }

    /// Pings both stores, measuring wall-clock latency per side. Never
    /// errors; an unreachable store reports `healthy: false`.
    pub async fn perform_health_check(&self) -> StoreHealthReport {
        StoreHealthReport {
            primary: Self::ping_store(self.primary.as_ref()).await,
            backup: Self::ping_store(self.backup.as_ref()).await,
        }
    }

    async fn ping_store(store: &dyn RecordStore) -> StoreHealth {
        let started = Instant::now();
        let result = store.ping().await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => StoreHealth {
                healthy: true,
                error: None,
                latency_ms,
            },
            Err(e) => StoreHealth {
                healthy: false,
                error: Some(e.to_string()),
                latency_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreRecord, StoreRole, WriteOp};
    use async_trait::async_trait;
    use serde_json::json;

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
        (
            Arc::new(MemoryStore::new(StoreRole::Primary)),
            Arc::new(MemoryStore::new(StoreRole::Backup)),
        )
    }

    async fn seed(store: &MemoryStore, table: Table, ids: &[&str]) {
        for id in ids {
            store
                .create(table, StoreRecord::with_id(*id, json!({})))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_report_invariants() {
        // difference and in_sync are derived exactly from the counts.
        let (primary, backup) = stores();
        seed(&primary, Table::User, &["u-1", "u-2", "u-3"]).await;
        seed(&backup, Table::User, &["u-1"]).await;

        let verifier = SyncVerifier::new(primary, backup);
        let status = verifier.verify_sync_status().await;
        let user_report = status
            .reports
            .iter()
            .find(|r| r.table == Table::User)
            .unwrap();
        assert_eq!(user_report.primary_count, 3);
        assert_eq!(user_report.backup_count, 1);
        assert_eq!(user_report.difference, 2);
        assert!(!user_report.in_sync);
        assert!(!status.overall);
    }

    #[tokio::test]
    async fn test_empty_stores_are_in_sync() {
        let (primary, backup) = stores();
        let verifier = SyncVerifier::new(primary, backup);
        let status = verifier.verify_sync_status().await;
        assert!(status.overall);
        assert_eq!(status.reports.len(), Table::ALL.len());
        assert!(status.reports.iter().all(|r| r.in_sync));
    }

    #[tokio::test]
    async fn test_mixed_tables_report_per_table() {
        let (primary, backup) = stores();
        seed(&primary, Table::User, &["u-1", "u-2"]).await;
        seed(&backup, Table::User, &["u-1", "u-2"]).await;
        seed(&primary, Table::Trip, &["t-1", "t-2", "t-3"]).await;
        seed(&backup, Table::Trip, &["t-1"]).await;

        let verifier = SyncVerifier::new(primary, backup);
        let status = verifier.verify_sync_status().await;
        assert!(!status.overall);
        let user = status.reports.iter().find(|r| r.table == Table::User).unwrap();
        let trip = status.reports.iter().find(|r| r.table == Table::Trip).unwrap();
        assert!(user.in_sync);
        assert_eq!(trip.difference, 2);
    }

    /// Store whose `count` fails for one specific table.
    struct BrokenTableStore {
        inner: MemoryStore,
        broken: Table,
    }

    #[async_trait]
    impl RecordStore for BrokenTableStore {
        async fn create(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord> {
            self.inner.create(table, record).await
        }
        async fn update(
            &self,
            table: Table,
            id: &str,
            patch: serde_json::Value,
        ) -> DbResult<StoreRecord> {
            self.inner.update(table, id, patch).await
        }
        async fn delete(&self, table: Table, id: &str) -> DbResult<StoreRecord> {
            self.inner.delete(table, id).await
        }
        async fn upsert(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord> {
            self.inner.upsert(table, record).await
        }
        async fn find_unique(&self, table: Table, id: &str) -> DbResult<Option<StoreRecord>> {
            self.inner.find_unique(table, id).await
        }
        async fn find_many(&self, table: Table, query: &Query) -> DbResult<Vec<StoreRecord>> {
            self.inner.find_many(table, query).await
        }
        async fn find_first(&self, table: Table, query: &Query) -> DbResult<Option<StoreRecord>> {
            self.inner.find_first(table, query).await
        }
        async fn count(&self, table: Table, filter: Option<&serde_json::Value>) -> DbResult<u64> {
            if table == self.broken {
                return Err(DualDbError::store(
                    StoreRole::Primary,
                    "count",
                    "relation corrupted",
                ));
            }
            self.inner.count(table, filter).await
        }
        async fn transaction(&self, ops: &[WriteOp]) -> DbResult<Vec<StoreRecord>> {
            self.inner.transaction(ops).await
        }
        async fn ping(&self) -> DbResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> DbResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_broken_table_does_not_block_the_pass() {
        // One failing table lands in errors; the other 18 still report.
        let primary = Arc::new(BrokenTableStore {
            inner: MemoryStore::new(StoreRole::Primary),
            broken: Table::Booking,
        });
        let backup = Arc::new(MemoryStore::new(StoreRole::Backup));

        let verifier = SyncVerifier::new(primary, backup);
        let status = verifier.verify_sync_status().await;
        assert!(!status.overall);
        assert_eq!(status.errors.len(), 1);
        assert!(status.errors[0].contains("booking"));
        assert_eq!(status.reports.len(), Table::ALL.len() - 1);
    }

    #[tokio::test]
    async fn test_find_sync_gaps_both_directions() {
        let (primary, backup) = stores();
        seed(&primary, Table::Activity, &["a-1", "a-2", "a-3"]).await;
        seed(&backup, Table::Activity, &["a-2", "a-3", "a-9"]).await;

        let verifier = SyncVerifier::new(primary, backup);
        let gaps = verifier.find_sync_gaps(Table::Activity, 50).await.unwrap();
        let missing_backup: Vec<&str> =
            gaps.missing_in_backup.iter().map(|k| k.id.as_str()).collect();
        let missing_primary: Vec<&str> =
            gaps.missing_in_primary.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(missing_backup, vec!["a-1"]);
        assert_eq!(missing_primary, vec!["a-9"]);
    }

    #[tokio::test]
    async fn test_find_sync_gaps_is_bounded_by_limit() {
        let (primary, backup) = stores();
        // Old records fall outside the sampled window and go undetected.
        let mut old = StoreRecord::with_id("a-old", json!({}));
        old.created_at = Utc::now() - chrono::Duration::days(30);
        primary.create(Table::Activity, old).await.unwrap();
        for i in 0..3 {
            let record = StoreRecord::with_id(format!("a-{i}"), json!({}));
            primary.create(Table::Activity, record.clone()).await.unwrap();
            backup.create(Table::Activity, record).await.unwrap();
        }

        let verifier = SyncVerifier::new(primary, backup);
        let gaps = verifier.find_sync_gaps(Table::Activity, 3).await.unwrap();
        assert!(gaps.missing_in_backup.is_empty());
    }

    #[tokio::test]
    async fn test_sync_missing_records_best_effort() {
        let (primary, backup) = stores();
        seed(&primary, Table::Trip, &["t-1", "t-2"]).await;

        let verifier = SyncVerifier::new(Arc::clone(&primary) as _, Arc::clone(&backup) as _);
        let ids = vec![
            "t-1".to_string(),
            "ghost".to_string(),
            "t-2".to_string(),
        ];
        let outcome = verifier.sync_missing_records(Table::Trip, &ids).await;
        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("ghost"));
        assert_eq!(backup.count(Table::Trip, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_generate_sync_report_recommendations() {
        let (primary, backup) = stores();
        seed(&primary, Table::Trip, &["t-1", "t-2"]).await;

        let verifier = SyncVerifier::new(primary, backup);
        let report = verifier.generate_sync_report().await;
        assert!(report.contains("# Database Sync Report"));
        assert!(report.contains("| trip | 2 | 0 | 2 |"));
        assert!(report.contains("## Recommendations"));
    }

    #[tokio::test]
    async fn test_health_check_measures_latency() {
        let (primary, backup) = stores();
        let verifier = SyncVerifier::new(primary, backup);
        let health = verifier.perform_health_check().await;
        assert!(health.primary.healthy);
        assert!(health.backup.healthy);
        assert!(health.primary.error.is_none());
    }
}
