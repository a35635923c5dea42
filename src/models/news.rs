// src/models/news.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPost {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// HTML produced by the admin editor.
    pub content: String,
    pub image: String,
    pub date: NaiveDate,
}

/// A news post as submitted by the admin console, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDraft {
    pub title: String,
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub image: String,
    pub date: NaiveDate,
}

impl NewsDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if self.title.chars().count() > 200 {
            return Err("Title is too long (max 200 chars)".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("Description is required".to_string());
        }
        Ok(())
    }
}

/// Newest first. The sort is stable, so a freshly prepended post stays ahead of
/// older posts sharing its date.
pub fn sort_by_date_desc(posts: &mut [NewsPost]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date));
}
