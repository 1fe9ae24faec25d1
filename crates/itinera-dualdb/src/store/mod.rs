//! Record store abstraction.
//!
//! Both datastores are consumed through [`RecordStore`], an async trait over
//! generic table records. The consistency layer never sees SQL or a concrete
//! client; it addresses tables through [`Table`](crate::tables::Table) and
//! rows through [`StoreRecord`].

mod memory;

pub use memory::MemoryStore;

use crate::error::DbResult;
use crate::tables::Table;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two stores an operation was issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    /// The authoritative datastore; its outcome decides the call.
    Primary,
    /// The best-effort mirror.
    Backup,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Backup => "backup",
        }
    }
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generic row in a mirrored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Table-specific payload; always a JSON object.
    pub data: serde_json::Value,
}

impl StoreRecord {
    /// Mint a new record with a fresh v4 id, stamping both timestamps.
    pub fn new(data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            data,
        }
    }

    /// Record with a caller-chosen id (upserts, fixtures).
    pub fn with_id(id: impl Into<String>, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            data,
        }
    }

    /// The identity projection used by gap diffing.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Identity-only projection of a record: `{id, created_at, updated_at}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single mutation in a typed transaction batch.
///
/// One batch describes the same logical work for either store, so the
/// manager can hand an identical list to both transaction primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Create { table: Table, record: StoreRecord },
    /// Shallow-merges `patch` into the record's data object.
    Update {
        table: Table,
        id: String,
        patch: serde_json::Value,
    },
    Delete { table: Table, id: String },
    Upsert { table: Table, record: StoreRecord },
}

impl WriteOp {
    pub fn table(&self) -> Table {
        match self {
            Self::Create { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::Upsert { table, .. } => *table,
        }
    }
}

/// Read query over a table: top-level field equality plus ordering and limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// JSON object matched for equality against top-level `data` fields.
    pub filter: Option<serde_json::Value>,
    /// Order by `created_at` descending (newest records first).
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl Query {
    /// The newest `limit` records, no filter. Used by gap sampling.
    pub fn newest(limit: usize) -> Self {
        Self {
            filter: None,
            newest_first: true,
            limit: Some(limit),
        }
    }
}

/// Capability set required from each of the two store collaborators.
///
/// Handles are long-lived, shared, and must be safe to call concurrently.
/// All methods are logical-table scoped; a trivial `ping` stands in for the
/// `SELECT 1` health query.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord>;

    /// Shallow-merges `patch` into the record's data and bumps `updated_at`.
    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: serde_json::Value,
    ) -> DbResult<StoreRecord>;

    /// Removes the record, returning it.
    async fn delete(&self, table: Table, id: &str) -> DbResult<StoreRecord>;

    /// Inserts or fully replaces by id.
    async fn upsert(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord>;

    async fn find_unique(&self, table: Table, id: &str) -> DbResult<Option<StoreRecord>>;

    async fn find_many(&self, table: Table, query: &Query) -> DbResult<Vec<StoreRecord>>;

    async fn find_first(&self, table: Table, query: &Query) -> DbResult<Option<StoreRecord>>;

    async fn count(&self, table: Table, filter: Option<&serde_json::Value>) -> DbResult<u64>;

    /// Applies the batch atomically inside the store's native transaction
    /// primitive, returning the affected records in op order.
    async fn transaction(&self, ops: &[WriteOp]) -> DbResult<Vec<StoreRecord>>;

    /// Trivial health query (`SELECT 1` equivalent).
    async fn ping(&self) -> DbResult<()>;

    /// Releases the underlying connection resources.
    async fn disconnect(&self) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_projection() {
        let record = StoreRecord::new(serde_json::json!({"title": "Lisbon"}));
        let key = record.key();
        assert_eq!(key.id, record.id);
        assert_eq!(key.created_at, record.created_at);
    }

    #[test]
    fn test_write_op_table() {
        let op = WriteOp::Delete {
            table: Table::Booking,
            id: "b-1".to_string(),
        };
        assert_eq!(op.table(), Table::Booking);
    }

    #[test]
    fn test_write_op_serde_tagging() {
        let op = WriteOp::Update {
            table: Table::Trip,
            id: "t-1".to_string(),
            patch: serde_json::json!({"status": "booked"}),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "update");
        assert_eq!(json["table"], "trip");
    }
}
