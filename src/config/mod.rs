use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rows::TimeZoneMode;

/// Complete connector configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WdcConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub rows: RowsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Remote service discovery
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service info document describing the API endpoint template
    #[serde(default = "default_service_info_url")]
    pub service_info_url: String,
    /// Application id announced in access requests
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// How long an access request may wait for the user to sign in
    #[serde(default = "default_access_timeout_secs")]
    pub access_timeout_secs: u64,
}

fn default_service_info_url() -> String {
    "https://reg.pryv.me/service/info".to_string()
}

fn default_app_id() -> String {
    "tableau-demo".to_string()
}

fn default_access_timeout_secs() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_info_url: default_service_info_url(),
            app_id: default_app_id(),
            access_timeout_secs: default_access_timeout_secs(),
        }
    }
}

/// Campaign (invitation directory) indirection links
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    /// Links starting with this prefix are expanded through the directory
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
    /// Directory API base URL
    #[serde(default = "default_campaign_api_url")]
    pub api_url: String,
    /// Domain used to build `https://<token>@<username>.<domain>/` endpoints
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_link_prefix() -> String {
    "https://sw.pryv.me/cmc/".to_string()
}

fn default_campaign_api_url() -> String {
    "https://cmc.pryv.me/api".to_string()
}

fn default_domain() -> String {
    "pryv.me".to_string()
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            link_prefix: default_link_prefix(),
            api_url: default_campaign_api_url(),
            domain: default_domain(),
        }
    }
}

/// Row rendering
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowsConfig {
    #[serde(default)]
    pub timezone: TimeZoneMode,
}

/// Defensive limits against remote data
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Deepest stream nesting accepted (roots are depth 0)
    #[serde(default = "default_max_stream_depth")]
    pub max_stream_depth: usize,
    /// Event limit when scanning for extra endpoints
    #[serde(default = "default_extra_endpoints_limit")]
    pub extra_endpoints_limit: u64,
    /// Longest error message shown by an endpoint check
    #[serde(default = "default_check_message_max_len")]
    pub check_message_max_len: usize,
}

fn default_max_stream_depth() -> usize {
    64
}

fn default_extra_endpoints_limit() -> u64 {
    10_000
}

fn default_check_message_max_len() -> usize {
    100
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_stream_depth: default_max_stream_depth(),
            extra_endpoints_limit: default_extra_endpoints_limit(),
            check_message_max_len: default_check_message_max_len(),
        }
    }
}

/// Local credential store
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_db_path() -> String {
    "credentials.db".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            profile: default_profile(),
        }
    }
}

impl WdcConfig {
    /// Loads configuration from a TOML file, then applies `PRYV_WDC_*` env overrides.
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let mut config: WdcConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults with `PRYV_WDC_*` env overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Applies overrides from `lookup`; unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PRYV_WDC_SERVICE_INFO_URL") {
            self.service.service_info_url = v;
        }
        if let Some(v) = lookup("PRYV_WDC_APP_ID") {
            self.service.app_id = v;
        }
        if let Some(v) = lookup("PRYV_WDC_CAMPAIGN_LINK_PREFIX") {
            self.campaign.link_prefix = v;
        }
        if let Some(v) = lookup("PRYV_WDC_CAMPAIGN_API_URL") {
            self.campaign.api_url = v;
        }
        if let Some(v) = lookup("PRYV_WDC_DOMAIN") {
            self.campaign.domain = v;
        }
        if let Some(v) = lookup("PRYV_WDC_TIMEZONE") {
            match v.to_ascii_lowercase().as_str() {
                "utc" => self.rows.timezone = TimeZoneMode::Utc,
                "local" => self.rows.timezone = TimeZoneMode::Local,
                _ => {}
            }
        }
        if let Some(v) = lookup("PRYV_WDC_MAX_STREAM_DEPTH") {
            if let Ok(n) = v.parse::<usize>() {
                self.limits.max_stream_depth = n;
            }
        }
        if let Some(v) = lookup("PRYV_WDC_CREDENTIALS_DB") {
            self.credentials.db_path = v;
        }
        if let Some(v) = lookup("PRYV_WDC_PROFILE") {
            self.credentials.profile = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = WdcConfig::default();
        assert_eq!(
            config.service.service_info_url,
            "https://reg.pryv.me/service/info"
        );
        assert_eq!(config.campaign.domain, "pryv.me");
        assert_eq!(config.rows.timezone, TimeZoneMode::Local);
        assert_eq!(config.limits.max_stream_depth, 64);
        assert_eq!(config.limits.extra_endpoints_limit, 10_000);
        assert_eq!(config.credentials.profile, "default");
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [service]
            service_info_url = "https://reg.example.com/service/info"

            [campaign]
            link_prefix = "https://cm.example.com/"
            api_url = "https://cm.example.com/api"
            domain = "example.com"

            [rows]
            timezone = "utc"

            [limits]
            max_stream_depth = 8
        "#;

        let config: WdcConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.campaign.domain, "example.com");
        assert_eq!(config.rows.timezone, TimeZoneMode::Utc);
        assert_eq!(config.limits.max_stream_depth, 8);
        assert_eq!(config.limits.check_message_max_len, 100); // Default
        assert_eq!(config.service.app_id, "tableau-demo"); // Default
        assert_eq!(config.service.access_timeout_secs, 300); // Default
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PRYV_WDC_DOMAIN", "pryv.io"),
            ("PRYV_WDC_TIMEZONE", "UTC"),
            ("PRYV_WDC_MAX_STREAM_DEPTH", "not-a-number"),
            ("PRYV_WDC_PROFILE", "work"),
            ("PRYV_WDC_APP_ID", "lab-wdc"),
        ]
        .into_iter()
        .collect();

        let mut config = WdcConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.campaign.domain, "pryv.io");
        assert_eq!(config.rows.timezone, TimeZoneMode::Utc);
        assert_eq!(config.limits.max_stream_depth, 64);
        assert_eq!(config.credentials.profile, "work");
        assert_eq!(config.service.app_id, "lab-wdc");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wdc.toml");
        std::fs::write(&path, "[credentials]\nprofile = \"lab\"\n").unwrap();

        let config = WdcConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.credentials.db_path, "credentials.db");
        assert!(WdcConfig::load("/nonexistent/wdc.toml").is_err());
    }
}
