// src/context/mod.rs
//! The site's view of the hosted database.
//!
//! [`DataContext`] keeps a snapshot of every collection the pages need, reloads a
//! collection whenever the database reports a change to it, and funnels every
//! write through the store before touching the snapshot. Reads degrade to bundled
//! defaults or the stale snapshot; writes report their error and leave the
//! snapshot alone.

pub mod defaults;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::models::news::sort_by_date_desc;
use crate::models::{
    ContactMessage, NewContact, NewsDraft, NewsPost, ServerStatus, ServerStatusPatch,
    SiteSettings, SiteSettingsPatch, SINGLETON_ID,
};
use crate::session::{CredentialVerifier, SessionId, SessionStore};
use crate::storage::{Filter, Order, RemoteStore, StoreError, Table};
use defaults::BundledDefaults;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub news: Vec<NewsPost>,
    pub server_status: ServerStatus,
    pub site_settings: SiteSettings,
    /// Empty unless an admin session is authenticated.
    pub contacts: Vec<ContactMessage>,
    pub loading: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            news: Vec::new(),
            server_status: ServerStatus::default(),
            site_settings: SiteSettings::default(),
            contacts: Vec::new(),
            loading: true,
        }
    }
}

pub struct DataContext<S: RemoteStore> {
    store: S,
    snapshot: RwLock<Snapshot>,
    sessions: SessionStore,
    verifier: Box<dyn CredentialVerifier>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> SyncResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(SyncError::from))
        .collect()
}

fn first_row(table: Table, rows: Vec<Value>) -> SyncResult<Value> {
    rows.into_iter()
        .next()
        .ok_or(SyncError::Store(StoreError::RowNotFound(table)))
}

/// Serializes `value` and stamps the `updated_at` column the hosted tables carry.
fn stamped<T: Serialize>(value: &T) -> SyncResult<Value> {
    let mut row = serde_json::to_value(value)?;
    if let Value::Object(fields) = &mut row {
        fields.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
    Ok(row)
}

fn reported<T>(action: &str, result: SyncResult<T>) -> SyncResult<T> {
    if let Err(e) = &result {
        error!("Error {}: {}", action, e);
    }
    result
}

impl<S: RemoteStore> DataContext<S> {
    pub fn new(store: S, verifier: Box<dyn CredentialVerifier>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Snapshot::default()),
            sessions: SessionStore::default(),
            verifier,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Admin sessions older than `max_age` stop counting as authenticated.
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.sessions = SessionStore::new(max_age);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- snapshot reads ----

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    pub fn news(&self) -> Vec<NewsPost> {
        self.snapshot.read().news.clone()
    }

    pub fn news_post(&self, id: i64) -> Option<NewsPost> {
        self.snapshot.read().news.iter().find(|p| p.id == id).cloned()
    }

    pub fn server_status(&self) -> ServerStatus {
        self.snapshot.read().server_status.clone()
    }

    pub fn site_settings(&self) -> SiteSettings {
        self.snapshot.read().site_settings.clone()
    }

    pub fn contacts(&self) -> Vec<ContactMessage> {
        self.snapshot.read().contacts.clone()
    }

    pub fn unread_contacts(&self) -> usize {
        self.snapshot.read().contacts.iter().filter(|c| !c.read).count()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.read().loading
    }

    // ---- loads ----

    /// Initial load of everything public. Each collection degrades on its own.
    pub async fn load_all(&self) {
        self.snapshot.write().loading = true;
        tokio::join!(
            self.load_news(),
            self.load_server_status(),
            self.load_site_settings()
        );
        self.snapshot.write().loading = false;
        info!("Loaded site data");
    }

    pub async fn load_news(&self) {
        let news = match self.fetch_news().await {
            Ok(posts) if !posts.is_empty() => posts,
            Ok(_) => {
                info!("No news posts stored, showing bundled posts");
                BundledDefaults::get().news.clone()
            }
            Err(e) => {
                error!("Error loading news: {}", e);
                BundledDefaults::get().news.clone()
            }
        };
        self.snapshot.write().news = news;
    }

    pub async fn load_server_status(&self) {
        let status = match self
            .fetch_singleton(Table::ServerStatus, ServerStatus::default())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                error!("Error loading server status: {}", e);
                BundledDefaults::get().server_status.clone()
            }
        };
        self.snapshot.write().server_status = status;
    }

    pub async fn load_site_settings(&self) {
        match self
            .fetch_singleton(Table::SiteSettings, SiteSettings::default())
            .await
        {
            Ok(settings) => self.snapshot.write().site_settings = settings,
            Err(e) => error!("Error loading site settings: {}", e),
        }
    }

    /// Only runs while an admin session is authenticated.
    pub async fn load_contacts(&self) {
        if !self.sessions.any_authenticated() {
            debug!("Skipping contacts load, no admin session");
            self.snapshot.write().contacts.clear();
            return;
        }

        let result = async {
            let rows = self
                .store
                .select(Table::Contacts, None, Some(Order::desc("created_at")))
                .await?;
            decode_rows::<ContactMessage>(rows)
        }
        .await;

        match result {
            Ok(contacts) => self.snapshot.write().contacts = contacts,
            Err(e) => error!("Error loading contacts: {}", e),
        }
    }

    pub async fn reload(&self, table: Table) {
        match table {
            Table::News => self.load_news().await,
            Table::ServerStatus => self.load_server_status().await,
            Table::Contacts => self.load_contacts().await,
            Table::SiteSettings => self.load_site_settings().await,
        }
    }

    async fn fetch_news(&self) -> SyncResult<Vec<NewsPost>> {
        let rows = self
            .store
            .select(Table::News, None, Some(Order::desc("date")))
            .await?;
        let mut posts = decode_rows::<NewsPost>(rows)?;
        sort_by_date_desc(&mut posts);
        Ok(posts)
    }

    /// Reads the singleton row of `table`, inserting `default` when it does not exist yet.
    async fn fetch_singleton<T>(&self, table: Table, default: T) -> SyncResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        match self.store.select_one(table, Filter::id(SINGLETON_ID)).await {
            Ok(row) => Ok(serde_json::from_value(row)?),
            Err(StoreError::RowNotFound(_)) => {
                info!("No {} row yet, creating it with defaults", table);
                let mut row = serde_json::to_value(&default)?;
                if let Value::Object(fields) = &mut row {
                    fields.insert("id".to_string(), Value::from(SINGLETON_ID));
                }
                let inserted = self.store.insert(table, row).await?;
                Ok(serde_json::from_value(inserted)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---- news ----

    pub async fn add_news(&self, draft: NewsDraft) -> SyncResult<NewsPost> {
        let result = async {
            draft.validate().map_err(SyncError::Invalid)?;
            let row = serde_json::to_value(&draft)?;
            let inserted = self.store.insert(Table::News, row).await?;
            Ok::<_, SyncError>(serde_json::from_value::<NewsPost>(inserted)?)
        }
        .await;
        let post = reported("adding news", result)?;

        let mut snapshot = self.snapshot.write();
        // A change notification may already have reloaded the new row.
        snapshot.news.retain(|p| p.id != post.id);
        snapshot.news.insert(0, post.clone());
        sort_by_date_desc(&mut snapshot.news);
        Ok(post)
    }

    pub async fn update_news(&self, id: i64, draft: NewsDraft) -> SyncResult<NewsPost> {
        let result = async {
            draft.validate().map_err(SyncError::Invalid)?;
            let rows = self
                .store
                .update(Table::News, Filter::id(id), stamped(&draft)?)
                .await?;
            Ok::<_, SyncError>(serde_json::from_value::<NewsPost>(first_row(
                Table::News,
                rows,
            )?)?)
        }
        .await;
        let post = reported("updating news", result)?;

        let mut snapshot = self.snapshot.write();
        match snapshot.news.iter_mut().find(|p| p.id == id) {
            Some(existing) => *existing = post.clone(),
            None => snapshot.news.push(post.clone()),
        }
        sort_by_date_desc(&mut snapshot.news);
        Ok(post)
    }

    pub async fn delete_news(&self, id: i64) -> SyncResult<()> {
        let result = self
            .store
            .delete(Table::News, Filter::id(id))
            .await
            .map_err(SyncError::from);
        reported("deleting news", result)?;

        self.snapshot.write().news.retain(|p| p.id != id);
        Ok(())
    }

    // ---- singletons ----

    pub async fn update_server_status(&self, patch: ServerStatusPatch) -> SyncResult<ServerStatus> {
        let result = async {
            let rows = self
                .store
                .update(Table::ServerStatus, Filter::id(SINGLETON_ID), stamped(&patch)?)
                .await?;
            first_row(Table::ServerStatus, rows)
        }
        .await;
        reported("updating server status", result)?;

        let mut snapshot = self.snapshot.write();
        snapshot.server_status.apply(&patch);
        Ok(snapshot.server_status.clone())
    }

    pub async fn update_site_settings(&self, patch: SiteSettingsPatch) -> SyncResult<SiteSettings> {
        let result = async {
            let rows = self
                .store
                .update(Table::SiteSettings, Filter::id(SINGLETON_ID), stamped(&patch)?)
                .await?;
            first_row(Table::SiteSettings, rows)
        }
        .await;
        reported("updating site settings", result)?;

        let mut snapshot = self.snapshot.write();
        snapshot.site_settings.apply(&patch);
        Ok(snapshot.site_settings.clone())
    }

    // ---- contacts ----

    pub async fn submit_contact(&self, contact: NewContact) -> SyncResult<ContactMessage> {
        let result = async {
            let contact = contact.normalized();
            contact.validate().map_err(SyncError::Invalid)?;
            let row = serde_json::to_value(&contact)?;
            let inserted = self.store.insert(Table::Contacts, row).await?;
            Ok::<_, SyncError>(serde_json::from_value::<ContactMessage>(inserted)?)
        }
        .await;
        let message = reported("submitting contact", result)?;
        info!("New contact message {} from {}", message.id, message.ign);

        if self.sessions.any_authenticated() {
            self.load_contacts().await;
        }
        Ok(message)
    }

    pub async fn mark_contact_as_read(&self, id: i64) -> SyncResult<()> {
        let result = async {
            let rows = self
                .store
                .update(
                    Table::Contacts,
                    Filter::id(id),
                    serde_json::json!({ "read": true }),
                )
                .await?;
            first_row(Table::Contacts, rows)
        }
        .await;
        reported("marking contact as read", result)?;

        for contact in self.snapshot.write().contacts.iter_mut() {
            if contact.id == id {
                contact.read = true;
            }
        }
        Ok(())
    }

    pub async fn delete_contact(&self, id: i64) -> SyncResult<()> {
        let result = self
            .store
            .delete(Table::Contacts, Filter::id(id))
            .await
            .map_err(SyncError::from);
        reported("deleting contact", result)?;

        self.snapshot.write().contacts.retain(|c| c.id != id);
        Ok(())
    }

    // ---- auth ----

    /// Opens an admin session when the credentials check out. A failed attempt
    /// changes nothing.
    pub async fn login(&self, username: &str, password: &str) -> Option<SessionId> {
        if !self.verifier.verify(username, password) {
            debug!("Rejected admin login for {:?}", username);
            return None;
        }

        let id = self.sessions.open();
        info!("Admin session opened ({} active)", self.sessions.count());
        self.load_contacts().await;
        Some(id)
    }

    pub fn logout(&self, id: &SessionId) -> bool {
        let closed = self.sessions.close(id);
        if closed && !self.sessions.any_authenticated() {
            self.snapshot.write().contacts.clear();
        }
        closed
    }

    pub fn is_authenticated(&self, id: &SessionId) -> bool {
        self.sessions.is_authenticated(id)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ---- lifecycle ----

    /// Spawns one listener per table; each change triggers a full reload of that
    /// table. Listeners hold a weak reference, so they never keep the context alive.
    pub fn start_subscriptions(self: &Arc<Self>) {
        for table in Table::ALL {
            let mut changes = match self.store.subscribe() {
                Ok(rx) => rx,
                Err(e) => {
                    warn!("Real-time updates disabled: {}", e);
                    return;
                }
            };
            let context = Arc::downgrade(self);

            let handle = tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok(event) if event.table != table => continue,
                        Ok(event) => debug!("{:?} on {}, reloading", event.kind, table),
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Missed {} change notifications, reloading {}", missed, table)
                        }
                        Err(RecvError::Closed) => break,
                    }
                    let Some(ctx) = context.upgrade() else {
                        break;
                    };
                    ctx.reload(table).await;
                }
            });
            self.subscriptions.lock().push(handle);
        }
        info!("Subscribed to change notifications for {} tables", Table::ALL.len());
    }

    /// Tears down change listeners.
    pub fn dispose(&self) {
        let handles: Vec<JoinHandle<()>> = self.subscriptions.lock().drain(..).collect();
        if !handles.is_empty() {
            info!("Closing {} change subscriptions", handles.len());
        }
        for handle in handles {
            handle.abort();
        }
    }
}

impl<S: RemoteStore> Drop for DataContext<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
