use governor::Quota;
use ipnetwork::IpNetwork;
use log::warn;
use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::session::{CredentialVerifier, LoginDisabled, StaticCredentials};
use crate::storage::rest::Endpoint;
use crate::utils::TrustedProxies;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// The hosted database (Supabase REST API).
    Supabase,
    /// Process-local tables, for development without a database.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "supabase" | "rest" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,

    // Hosted database
    pub store_backend: StoreBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Shared secret expected on change-notification webhooks.
    pub webhook_secret: Option<String>,

    // Admin account
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    // Contact form rate limiting
    pub contact_period_secs: u64,
    pub contact_burst_limit: u32,
    /// Proxies whose `X-Forwarded-For` header is believed. Empty means the peer
    /// address is always the client.
    pub trusted_proxies: Vec<IpNetwork>,

    /// Admin sessions older than this are dropped.
    pub session_max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            store_backend: StoreBackend::Supabase,
            supabase_url: None,
            supabase_key: None,
            request_timeout_secs: 10,
            webhook_secret: None,
            admin_username: None,
            admin_password: None,
            contact_period_secs: 60,
            contact_burst_limit: 3,
            trusted_proxies: Vec::new(),
            session_max_age_secs: 12 * 60 * 60,
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", key, value);
            default
        }),
        Err(_) => default,
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn networks(key: &str) -> Vec<IpNetwork> {
    let Ok(value) = env::var(key) else {
        return Vec::new();
    };
    parse_networks(key, &value)
}

fn parse_networks(key: &str, value: &str) -> Vec<IpNetwork> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<IpNetwork>() {
            Ok(network) => Some(network),
            Err(e) => {
                warn!("Ignoring invalid {} entry {:?}: {}", key, entry, e);
                None
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: parsed("PORT", defaults.port),

            store_backend: parsed("STORE_BACKEND", defaults.store_backend),
            supabase_url: optional("SUPABASE_URL"),
            supabase_key: optional("SUPABASE_ANON_KEY"),
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            webhook_secret: optional("WEBHOOK_SECRET"),

            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),

            contact_period_secs: parsed("CONTACT_PERIOD_SECS", defaults.contact_period_secs),
            contact_burst_limit: parsed("CONTACT_BURST_LIMIT", defaults.contact_burst_limit),
            trusted_proxies: networks("TRUSTED_PROXIES"),

            session_max_age_secs: parsed("SESSION_MAX_AGE_SECS", defaults.session_max_age_secs),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Both the URL and the access key, or nothing.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(url), Some(key)) => Some(Endpoint {
                url: url.clone(),
                key: key.clone(),
            }),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn credentials(&self) -> Box<dyn CredentialVerifier> {
        match (&self.admin_username, &self.admin_password) {
            (Some(username), Some(password)) => {
                Box::new(StaticCredentials::new(username.clone(), password.clone()))
            }
            _ => {
                warn!("ADMIN_USERNAME/ADMIN_PASSWORD not set, admin login is disabled");
                Box::new(LoginDisabled)
            }
        }
    }

    pub fn trusted_proxies(&self) -> TrustedProxies {
        TrustedProxies(self.trusted_proxies.clone())
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn contact_quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.contact_burst_limit).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(Duration::from_secs(self.contact_period_secs.max(1)))
            .map(|quota| quota.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_minute(burst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_needs_url_and_key() {
        let mut config = Config {
            supabase_url: Some("https://abc.supabase.co".into()),
            ..Config::default()
        };
        assert!(config.endpoint().is_none());

        config.supabase_key = Some("anon".into());
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.url, "https://abc.supabase.co");
        assert_eq!(endpoint.key, "anon");
    }

    #[test]
    fn login_is_disabled_without_admin_account() {
        let config = Config::default();
        assert!(!config.credentials().verify("admin", "admin"));

        let config = Config {
            admin_username: Some("owner".into()),
            admin_password: Some("s3cret".into()),
            ..Config::default()
        };
        assert!(config.credentials().verify("owner", "s3cret"));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("Supabase".parse::<StoreBackend>(), Ok(StoreBackend::Supabase));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn trusted_proxies_skip_bad_entries() {
        let networks = parse_networks("TRUSTED_PROXIES", "10.0.0.0/8, nonsense,,127.0.0.1");
        assert_eq!(networks.len(), 2);

        let config = Config {
            trusted_proxies: networks,
            ..Config::default()
        };
        let trusted = config.trusted_proxies();
        assert!(trusted.contains("10.20.30.40".parse().unwrap()));
        assert!(trusted.contains("127.0.0.1".parse().unwrap()));
        assert!(!trusted.contains("127.0.0.2".parse().unwrap()));
        assert!(!Config::default().trusted_proxies().contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn zero_burst_still_yields_a_quota() {
        let config = Config {
            contact_burst_limit: 0,
            contact_period_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.contact_quota().burst_size().get(), 1);
    }
}
