// src/context/defaults.rs
use log::error;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::models::news::sort_by_date_desc;
use crate::models::{NewsPost, ServerStatus};

const BUNDLED: &str = include_str!("../../data/defaults.json");

static DEFAULTS: OnceLock<BundledDefaults> = OnceLock::new();

/// Data shipped with the binary, shown whenever the hosted database cannot be read.
#[derive(Debug, Clone, Deserialize)]
pub struct BundledDefaults {
    pub news: Vec<NewsPost>,
    pub server_status: ServerStatus,
}

impl BundledDefaults {
    pub fn get() -> &'static BundledDefaults {
        DEFAULTS.get_or_init(|| match serde_json::from_str::<BundledDefaults>(BUNDLED) {
            Ok(mut defaults) => {
                sort_by_date_desc(&mut defaults.news);
                defaults
            }
            Err(e) => {
                error!("Bundled default data is malformed: {}", e);
                BundledDefaults {
                    news: Vec::new(),
                    server_status: ServerStatus::default(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_parse() {
        let defaults = BundledDefaults::get();
        assert!(!defaults.news.is_empty());
        assert!(defaults
            .news
            .windows(2)
            .all(|pair| pair[0].date >= pair[1].date));
        assert_eq!(defaults.server_status, ServerStatus::default());
    }
}
