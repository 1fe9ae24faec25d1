//! In-memory [`RecordStore`] backend.
//!
//! Backs the test suite and embedded/demo deployments. Data lives in a
//! single `RwLock`-guarded map of tables; transactions are applied against
//! a cloned snapshot and committed only when every op succeeds.

use super::{Query, RecordStore, StoreRecord, StoreRole, WriteOp};
use crate::error::{DbResult, DualDbError};
use crate::tables::Table;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

type TableData = HashMap<String, StoreRecord>;

pub struct MemoryStore {
    role: StoreRole,
    tables: RwLock<HashMap<Table, TableData>>,
}

impl MemoryStore {
    pub fn new(role: StoreRole) -> Self {
        Self {
            role,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    fn err(&self, operation: &str, message: impl Into<String>) -> DualDbError {
        DualDbError::store(self.role, operation, message)
    }

    /// Equality match of `filter` fields against the record's data object.
    fn matches(record: &StoreRecord, filter: Option<&serde_json::Value>) -> bool {
        let Some(serde_json::Value::Object(fields)) = filter else {
            return true;
        };
        fields
            .iter()
            .all(|(key, expected)| record.data.get(key) == Some(expected))
    }

    fn select(table_data: &TableData, query: &Query) -> Vec<StoreRecord> {
        let mut records: Vec<StoreRecord> = table_data
            .values()
            .filter(|r| Self::matches(r, query.filter.as_ref()))
            .cloned()
            .collect();
        // Tie-break on id for a deterministic order within one timestamp.
        records.sort_by(|a, b| {
            if query.newest_first {
                b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
            } else {
                a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
            }
        });
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        records
    }

    fn apply_op(&self, tables: &mut HashMap<Table, TableData>, op: &WriteOp) -> DbResult<StoreRecord> {
        match op {
            WriteOp::Create { table, record } => {
                let data = tables.entry(*table).or_default();
                if data.contains_key(&record.id) {
                    return Err(self.err(
                        "create",
                        format!("duplicate id '{}' in table '{}'", record.id, table),
                    ));
                }
                data.insert(record.id.clone(), record.clone());
                Ok(record.clone())
            }
            WriteOp::Update { table, id, patch } => {
                let data = tables.entry(*table).or_default();
                let record = data
                    .get_mut(id)
                    .ok_or_else(|| DualDbError::NotFound {
                        table: *table,
                        id: id.clone(),
                    })?;
                if let (Some(target), serde_json::Value::Object(fields)) =
                    (record.data.as_object_mut(), patch)
                {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
                record.updated_at = Utc::now();
                Ok(record.clone())
            }
            WriteOp::Delete { table, id } => {
                let data = tables.entry(*table).or_default();
                data.remove(id).ok_or_else(|| DualDbError::NotFound {
                    table: *table,
                    id: id.clone(),
                })
            }
            WriteOp::Upsert { table, record } => {
                let data = tables.entry(*table).or_default();
                let stored = match data.get(&record.id) {
                    Some(existing) => StoreRecord {
                        id: record.id.clone(),
                        created_at: existing.created_at,
                        updated_at: Utc::now(),
                        data: record.data.clone(),
                    },
                    None => record.clone(),
                };
                data.insert(stored.id.clone(), stored.clone());
                Ok(stored)
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord> {
        let mut tables = self.tables.write();
        self.apply_op(
            &mut tables,
            &WriteOp::Create { table, record },
        )
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: serde_json::Value,
    ) -> DbResult<StoreRecord> {
        let mut tables = self.tables.write();
        self.apply_op(
            &mut tables,
            &WriteOp::Update {
                table,
                id: id.to_string(),
                patch,
            },
        )
    }

    async fn delete(&self, table: Table, id: &str) -> DbResult<StoreRecord> {
        let mut tables = self.tables.write();
        self.apply_op(
            &mut tables,
            &WriteOp::Delete {
                table,
                id: id.to_string(),
            },
        )
    }

    async fn upsert(&self, table: Table, record: StoreRecord) -> DbResult<StoreRecord> {
        let mut tables = self.tables.write();
        self.apply_op(&mut tables, &WriteOp::Upsert { table, record })
    }

    async fn find_unique(&self, table: Table, id: &str) -> DbResult<Option<StoreRecord>> {
        let tables = self.tables.read();
        Ok(tables.get(&table).and_then(|data| data.get(id)).cloned())
    }

    async fn find_many(&self, table: Table, query: &Query) -> DbResult<Vec<StoreRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .get(&table)
            .map(|data| Self::select(data, query))
            .unwrap_or_default())
    }

    async fn find_first(&self, table: Table, query: &Query) -> DbResult<Option<StoreRecord>> {
        let mut query = query.clone();
        query.limit = Some(1);
        Ok(self.find_many(table, &query).await?.into_iter().next())
    }

    async fn count(&self, table: Table, filter: Option<&serde_json::Value>) -> DbResult<u64> {
        let tables = self.tables.read();
        Ok(tables
            .get(&table)
            .map(|data| {
                data.values()
                    .filter(|r| Self::matches(r, filter))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn transaction(&self, ops: &[WriteOp]) -> DbResult<Vec<StoreRecord>> {
        let mut tables = self.tables.write();
        // Snapshot-and-commit: mutate a clone, swap it in only on success.
        let mut staged = tables.clone();
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(self.apply_op(&mut staged, op)?);
        }
        *tables = staged;
        Ok(results)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(StoreRole::Primary)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = store();
        let record = StoreRecord::with_id("t-1", json!({"title": "Porto"}));
        store.create(Table::Trip, record).await.unwrap();

        let found = store.find_unique(Table::Trip, "t-1").await.unwrap();
        assert_eq!(found.unwrap().data["title"], "Porto");
        assert_eq!(store.count(Table::Trip, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = store();
        let record = StoreRecord::with_id("t-1", json!({}));
        store.create(Table::Trip, record.clone()).await.unwrap();
        assert!(store.create(Table::Trip, record).await.is_err());
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let store = store();
        let record = StoreRecord::with_id("t-1", json!({"title": "Porto", "days": 3}));
        store.create(Table::Trip, record).await.unwrap();

        let updated = store
            .update(Table::Trip, "t-1", json!({"days": 5}))
            .await
            .unwrap();
        assert_eq!(updated.data["title"], "Porto");
        assert_eq!(updated.data["days"], 5);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = store();
        let err = store
            .update(Table::Trip, "missing", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let store = store();
        let record = StoreRecord::with_id("t-1", json!({"title": "Porto"}));
        let created_at = record.created_at;
        store.create(Table::Trip, record).await.unwrap();

        let replaced = store
            .upsert(
                Table::Trip,
                StoreRecord::with_id("t-1", json!({"title": "Faro"})),
            )
            .await
            .unwrap();
        assert_eq!(replaced.created_at, created_at);
        assert_eq!(replaced.data["title"], "Faro");
    }

    #[tokio::test]
    async fn test_filter_equality() {
        let store = store();
        for (id, status) in [("a-1", "planned"), ("a-2", "booked"), ("a-3", "booked")] {
            store
                .create(
                    Table::Activity,
                    StoreRecord::with_id(id, json!({"status": status})),
                )
                .await
                .unwrap();
        }
        let filter = json!({"status": "booked"});
        assert_eq!(
            store.count(Table::Activity, Some(&filter)).await.unwrap(),
            2
        );
        let found = store
            .find_many(
                Table::Activity,
                &Query {
                    filter: Some(filter),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_newest_first_limit() {
        let store = store();
        for i in 0..5 {
            let mut record = StoreRecord::with_id(format!("a-{i}"), json!({}));
            record.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.create(Table::Activity, record).await.unwrap();
        }
        let newest = store
            .find_many(Table::Activity, &Query::newest(2))
            .await
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].id, "a-4");
        assert_eq!(newest[1].id, "a-3");
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let store = store();
        let ops = vec![
            WriteOp::Create {
                table: Table::Trip,
                record: StoreRecord::with_id("t-1", json!({})),
            },
            // References a record that does not exist: whole batch must fail.
            WriteOp::Update {
                table: Table::Trip,
                id: "missing".to_string(),
                patch: json!({}),
            },
        ];
        assert!(store.transaction(&ops).await.is_err());
        assert_eq!(store.count(Table::Trip, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commits_in_order() {
        let store = store();
        let ops = vec![
            WriteOp::Create {
                table: Table::Trip,
                record: StoreRecord::with_id("t-1", json!({"title": "Porto"})),
            },
            WriteOp::Update {
                table: Table::Trip,
                id: "t-1".to_string(),
                patch: json!({"title": "Faro"}),
            },
        ];
        let results = store.transaction(&ops).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].data["title"], "Faro");
        let stored = store.find_unique(Table::Trip, "t-1").await.unwrap().unwrap();
        assert_eq!(stored.data["title"], "Faro");
    }
}
