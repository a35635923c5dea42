// src/storage/memory.rs
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::broadcast;

use super::{
    ChangeEvent, ChangeHub, ChangeKind, Filter, Order, RemoteStore, StoreError, StoreResult, Table,
};

#[derive(Default)]
struct TableRows {
    rows: Vec<Value>,
    next_id: i64,
}

/// Process-local stand-in for the hosted database.
///
/// Generates ids the way the hosted tables do, fills in `created_at`/`read` for
/// contacts, and publishes a change notification after every mutation.
pub struct MemoryStore {
    tables: DashMap<Table, TableRows>,
    changes: ChangeHub,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            changes: ChangeHub::default(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn changes(&self) -> &ChangeHub {
        &self.changes
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Snapshot of a table, in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .get(&table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn notify(&self, table: Table, kind: ChangeKind) {
        self.changes.publish(ChangeEvent { table, kind });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_column(a: &Value, b: &Value, column: &str) -> Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn fill_generated_columns(table: Table, row: &mut Map<String, Value>) {
    match table {
        Table::Contacts => {
            row.entry("read").or_insert(Value::Bool(false));
            row.entry("created_at")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)));
            row.entry("phone").or_insert(Value::Null);
        }
        Table::SiteSettings => {
            row.entry("maintenance_mode").or_insert(Value::Bool(false));
        }
        Table::News | Table::ServerStatus => {}
    }
}

impl RemoteStore for MemoryStore {
    async fn select(
        &self,
        table: Table,
        filter: Option<Filter>,
        order: Option<Order>,
    ) -> StoreResult<Vec<Value>> {
        self.check_online()?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
            .collect();
        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ord = compare_column(a, b, order.column);
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        Ok(rows)
    }

    async fn select_one(&self, table: Table, filter: Filter) -> StoreResult<Value> {
        let mut rows = self.select(table, Some(filter), None).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(StoreError::RowNotFound(table)),
            n => Err(StoreError::Rejected {
                status: 406,
                message: format!("expected a single row in {}, found {}", table, n),
            }),
        }
    }

    async fn insert(&self, table: Table, row: Value) -> StoreResult<Value> {
        self.check_online()?;
        let Value::Object(mut row) = row else {
            return Err(StoreError::Rejected {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };

        let stored = {
            let mut entry = self.tables.entry(table).or_default();
            let id = match row.get("id").and_then(Value::as_i64) {
                Some(id) => {
                    if entry.rows.iter().any(|r| r.get("id").and_then(Value::as_i64) == Some(id)) {
                        return Err(StoreError::Rejected {
                            status: 409,
                            message: format!("duplicate key id={} in {}", id, table),
                        });
                    }
                    id
                }
                None => entry.next_id + 1,
            };
            entry.next_id = entry.next_id.max(id);
            row.insert("id".to_string(), Value::from(id));
            fill_generated_columns(table, &mut row);

            let stored = Value::Object(row);
            entry.rows.push(stored.clone());
            stored
        };

        self.notify(table, ChangeKind::Insert);
        Ok(stored)
    }

    async fn update(&self, table: Table, filter: Filter, patch: Value) -> StoreResult<Vec<Value>> {
        self.check_online()?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::Rejected {
                status: 400,
                message: "patch must be a JSON object".to_string(),
            });
        };

        let updated: Vec<Value> = match self.tables.get_mut(&table) {
            Some(mut entry) => entry
                .rows
                .iter_mut()
                .filter(|row| filter.matches(row))
                .map(|row| {
                    if let Value::Object(fields) = row {
                        for (key, value) in &patch {
                            fields.insert(key.clone(), value.clone());
                        }
                    }
                    row.clone()
                })
                .collect(),
            None => Vec::new(),
        };

        if !updated.is_empty() {
            self.notify(table, ChangeKind::Update);
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: Filter) -> StoreResult<Vec<Value>> {
        self.check_online()?;
        let removed: Vec<Value> = match self.tables.get_mut(&table) {
            Some(mut entry) => {
                let (removed, kept): (Vec<Value>, Vec<Value>) =
                    entry.rows.drain(..).partition(|row| filter.matches(row));
                entry.rows = kept;
                removed
            }
            None => Vec::new(),
        };

        if !removed.is_empty() {
            self.notify(table, ChangeKind::Delete);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> StoreResult<broadcast::Receiver<ChangeEvent>> {
        Ok(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = store.insert(Table::News, json!({"title": "a"})).await.unwrap();
        let b = store.insert(Table::News, json!({"title": "b"})).await.unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 2);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_singleton() {
        let store = MemoryStore::new();
        store.insert(Table::ServerStatus, json!({"id": 1})).await.unwrap();
        let err = store.insert(Table::ServerStatus, json!({"id": 1})).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn contacts_get_generated_columns() {
        let store = MemoryStore::new();
        let row = store
            .insert(Table::Contacts, json!({"ign": "Alex", "email": "a@b.co"}))
            .await
            .unwrap();
        assert_eq!(row["read"], false);
        assert!(row["created_at"].is_string());
        assert!(row["phone"].is_null());
    }

    #[tokio::test]
    async fn select_one_reports_missing_row() {
        let store = MemoryStore::new();
        let err = store.select_one(Table::SiteSettings, Filter::id(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::RowNotFound(Table::SiteSettings)));
    }

    #[tokio::test]
    async fn select_orders_descending() {
        let store = MemoryStore::new();
        for date in ["2024-01-02", "2024-03-01", "2023-12-31"] {
            store.insert(Table::News, json!({"date": date})).await.unwrap();
        }
        let rows = store
            .select(Table::News, None, Some(Order::desc("date")))
            .await
            .unwrap();
        let dates: Vec<&str> = rows.iter().map(|r| r["date"].as_str().unwrap()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-01-02", "2023-12-31"]);
    }

    #[tokio::test]
    async fn update_and_delete_only_touch_matching_rows() {
        let store = MemoryStore::new();
        store.insert(Table::News, json!({"title": "a"})).await.unwrap();
        store.insert(Table::News, json!({"title": "b"})).await.unwrap();

        let updated = store
            .update(Table::News, Filter::id(2), json!({"title": "B"}))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["title"], "B");

        let missing = store
            .update(Table::News, Filter::id(9), json!({"title": "?"}))
            .await
            .unwrap();
        assert!(missing.is_empty());

        let removed = store.delete(Table::News, Filter::id(1)).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.rows(Table::News).len(), 1);
    }

    #[tokio::test]
    async fn mutations_publish_changes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe().unwrap();
        store.insert(Table::Contacts, json!({"ign": "x"})).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, Table::Contacts);
        assert_eq!(event.kind, ChangeKind::Insert);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.select(Table::News, None, None).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.insert(Table::News, json!({})).await.is_err());
    }
}
