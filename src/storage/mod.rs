// src/storage/mod.rs
//! Access to the hosted database that backs the site.
//!
//! Rows travel as `serde_json::Value` so the same store can serve every table;
//! the sync context converts them into the typed models.

pub mod memory;
pub mod rest;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use memory::MemoryStore;
use rest::RestStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("remote store is not configured")]
    NotConfigured,

    #[error("remote store is unavailable: {0}")]
    Unavailable(String),

    #[error("no matching row in {0}")]
    RowNotFound(Table),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    News,
    ServerStatus,
    Contacts,
    SiteSettings,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::News,
        Table::ServerStatus,
        Table::Contacts,
        Table::SiteSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::News => "news",
            Table::ServerStatus => "server_status",
            Table::Contacts => "contacts",
            Table::SiteSettings => "site_settings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown table: {}", s))
    }
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    pub fn id(id: i64) -> Self {
        Self::eq("id", id)
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(self.column) == Some(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

impl Order {
    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
}

/// Fan-out point for row change notifications.
///
/// Cloning shares the underlying channel, so whoever receives notifications from
/// the database (the webhook handler, or the in-memory store itself) publishes
/// into the same hub the sync context listens on.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No listeners yet is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Table-style CRUD plus change notifications.
pub trait RemoteStore: Send + Sync + 'static {
    /// All rows matching `filter`, optionally ordered.
    fn select(
        &self,
        table: Table,
        filter: Option<Filter>,
        order: Option<Order>,
    ) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Exactly one row; `StoreError::RowNotFound` when nothing matches.
    fn select_one(
        &self,
        table: Table,
        filter: Filter,
    ) -> impl Future<Output = StoreResult<Value>> + Send;

    /// Inserts `row` and returns it as stored (with generated columns filled in).
    fn insert(&self, table: Table, row: Value) -> impl Future<Output = StoreResult<Value>> + Send;

    /// Applies `patch` to matching rows and returns the updated rows.
    fn update(
        &self,
        table: Table,
        filter: Filter,
        patch: Value,
    ) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Removes matching rows and returns them.
    fn delete(
        &self,
        table: Table,
        filter: Filter,
    ) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Change notifications for every table. Fails when notifications cannot be
    /// delivered (e.g. the store is not configured).
    fn subscribe(&self) -> StoreResult<broadcast::Receiver<ChangeEvent>>;
}

/// The store selected at startup.
pub enum Backend {
    Rest(RestStore),
    Memory(MemoryStore),
}

impl Backend {
    pub fn changes(&self) -> &ChangeHub {
        match self {
            Backend::Rest(store) => store.changes(),
            Backend::Memory(store) => store.changes(),
        }
    }
}

impl RemoteStore for Backend {
    async fn select(
        &self,
        table: Table,
        filter: Option<Filter>,
        order: Option<Order>,
    ) -> StoreResult<Vec<Value>> {
        match self {
            Backend::Rest(store) => store.select(table, filter, order).await,
            Backend::Memory(store) => store.select(table, filter, order).await,
        }
    }

    async fn select_one(&self, table: Table, filter: Filter) -> StoreResult<Value> {
        match self {
            Backend::Rest(store) => store.select_one(table, filter).await,
            Backend::Memory(store) => store.select_one(table, filter).await,
        }
    }

    async fn insert(&self, table: Table, row: Value) -> StoreResult<Value> {
        match self {
            Backend::Rest(store) => store.insert(table, row).await,
            Backend::Memory(store) => store.insert(table, row).await,
        }
    }

    async fn update(&self, table: Table, filter: Filter, patch: Value) -> StoreResult<Vec<Value>> {
        match self {
            Backend::Rest(store) => store.update(table, filter, patch).await,
            Backend::Memory(store) => store.update(table, filter, patch).await,
        }
    }

    async fn delete(&self, table: Table, filter: Filter) -> StoreResult<Vec<Value>> {
        match self {
            Backend::Rest(store) => store.delete(table, filter).await,
            Backend::Memory(store) => store.delete(table, filter).await,
        }
    }

    fn subscribe(&self) -> StoreResult<broadcast::Receiver<ChangeEvent>> {
        match self {
            Backend::Rest(store) => store.subscribe(),
            Backend::Memory(store) => store.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("users".parse::<Table>().is_err());
    }

    #[test]
    fn filter_matches_on_column_value() {
        let filter = Filter::id(7);
        assert!(filter.matches(&json!({"id": 7, "title": "x"})));
        assert!(!filter.matches(&json!({"id": 8})));
        assert!(!filter.matches(&json!({"title": "x"})));
    }

    #[tokio::test]
    async fn hub_delivers_to_every_subscriber() {
        let hub = ChangeHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.clone().subscribe();
        let event = ChangeEvent {
            table: Table::News,
            kind: ChangeKind::Insert,
        };
        hub.publish(event);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }
}
