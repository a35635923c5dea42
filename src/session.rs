// src/session.rs
use dashmap::DashMap;
use log::debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::utils::constant_time_eq;

/// Name of the cookie that carries an admin session for the lifetime of the
/// browser session.
pub const SESSION_COOKIE: &str = "adminAuth";

pub type SessionId = Uuid;

/// Decides whether a username/password pair may open an admin session.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single admin account taken from configuration.
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        // Compare both halves so a wrong username costs the same as a wrong password.
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

/// Used when no admin account is configured: every login is refused.
pub struct LoginDisabled;

impl CredentialVerifier for LoginDisabled {
    fn verify(&self, _username: &str, _password: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    /// Unix seconds.
    pub opened_at: u64,
}

/// Sessions are dropped after this long unless configured otherwise.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Authenticated admin sessions. A session id absent from the store, or older
/// than the maximum age, is anonymous.
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_age,
        }
    }

    fn is_live(&self, session: &Session, now: u64) -> bool {
        now.saturating_sub(session.opened_at) < self.max_age.as_secs()
    }

    /// Drops expired sessions; returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = now_secs();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| self.is_live(session, now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn open(&self) -> SessionId {
        let pruned = self.prune();
        if pruned > 0 {
            debug!("Dropped {} expired admin sessions", pruned);
        }
        let id = Uuid::new_v4();
        self.sessions.insert(id, Session { opened_at: now_secs() });
        id
    }

    /// Returns whether the session was authenticated.
    pub fn close(&self, id: &SessionId) -> bool {
        let now = now_secs();
        self.sessions
            .remove(id)
            .map_or(false, |(_, session)| self.is_live(&session, now))
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let now = now_secs();
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .filter(|session| self.is_live(session, now))
    }

    pub fn is_authenticated(&self, id: &SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn any_authenticated(&self) -> bool {
        self.prune();
        !self.sessions.is_empty()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}
