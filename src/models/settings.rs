// src/models/settings.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub server_ip: String,
    pub server_version: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub discord_url: String,
    pub site_title: String,
    #[serde(default)]
    pub maintenance_mode: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            server_ip: "play.buildnchill.com".to_string(),
            server_version: "1.20.4".to_string(),
            contact_email: "contact@buildnchill.com".to_string(),
            contact_phone: "+1 (234) 567-890".to_string(),
            discord_url: "https://discord.gg/buildnchill".to_string(),
            site_title: "BuildnChill".to_string(),
            maintenance_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
}

impl SiteSettings {
    pub fn apply(&mut self, patch: &SiteSettingsPatch) {
        let fields = [
            (&mut self.server_ip, &patch.server_ip),
            (&mut self.server_version, &patch.server_version),
            (&mut self.contact_email, &patch.contact_email),
            (&mut self.contact_phone, &patch.contact_phone),
            (&mut self.discord_url, &patch.discord_url),
            (&mut self.site_title, &patch.site_title),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        if let Some(maintenance_mode) = patch.maintenance_mode {
            self.maintenance_mode = maintenance_mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_partial_settings() {
        let mut settings = SiteSettings::default();
        settings.apply(&SiteSettingsPatch {
            site_title: Some("BnC".into()),
            maintenance_mode: Some(true),
            ..Default::default()
        });
        assert_eq!(settings.site_title, "BnC");
        assert!(settings.maintenance_mode);
        assert_eq!(settings.server_ip, "play.buildnchill.com");
    }
}
