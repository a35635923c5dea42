// src/models/contact.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: i64,
    /// In-game name.
    pub ign: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub ign: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

impl NewContact {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("ign", &self.ign),
            ("email", &self.email),
            ("subject", &self.subject),
            ("message", &self.message),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("Invalid {}: Must be at least 1 char.", name));
            }
        }
        if self.ign.chars().count() > 32 {
            return Err("Invalid ign: Too long (max 32 chars).".to_string());
        }
        if !looks_like_email(self.email.trim()) {
            return Err("Invalid email address.".to_string());
        }
        if self.message.chars().count() > 5000 {
            return Err("Invalid message: Too long (max 5000 chars).".to_string());
        }
        Ok(())
    }

    /// Trimmed copy with a blank phone collapsed to `None`.
    pub fn normalized(&self) -> Self {
        Self {
            ign: self.ign.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}
