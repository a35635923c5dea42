// src/models/status.rs
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    #[serde(alias = "online", alias = "ONLINE")]
    Online,
    #[serde(alias = "offline", alias = "OFFLINE")]
    Offline,
}

/// Display fields for the game server, stored as the singleton `server_status` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub status: ServerState,
    #[serde(deserialize_with = "count_from_text")]
    pub players: u32,
    #[serde(deserialize_with = "count_from_text")]
    pub max_players: u32,
    pub version: String,
    pub uptime: String,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            status: ServerState::Online,
            players: 0,
            max_players: 500,
            version: "1.20.4".to_string(),
            uptime: "99.9%".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatusPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

impl ServerStatus {
    pub fn apply(&mut self, patch: &ServerStatusPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(players) = patch.players {
            self.players = players;
        }
        if let Some(max_players) = patch.max_players {
            self.max_players = max_players;
        }
        if let Some(version) = &patch.version {
            self.version = version.clone();
        }
        if let Some(uptime) = &patch.uptime {
            self.uptime = uptime.clone();
        }
    }
}

impl From<&ServerStatus> for ServerStatusPatch {
    fn from(status: &ServerStatus) -> Self {
        Self {
            status: Some(status.status),
            players: Some(status.players),
            max_players: Some(status.max_players),
            version: Some(status.version.clone()),
            uptime: Some(status.uptime.clone()),
        }
    }
}

// The hosted table keeps player counts in text columns.
fn count_from_text<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u32),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
