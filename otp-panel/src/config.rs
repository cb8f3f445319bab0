use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use otp_client::UpdateVerb;

use crate::state::Tab;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub panel: PanelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApiConfig {
    Http {
        /// API prefix of the service, e.g. `http://localhost:5000/api`
        base_url: String,
        /// Per-request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Verb the service expects for device updates
        #[serde(default)]
        device_update: UpdateVerb,
    },
    /// In-memory service, for demos and offline work
    Mock {
        #[serde(default)]
        demo: bool,
    },
}

impl ApiConfig {
    pub fn http(base_url: impl Into<String>) -> Self {
        ApiConfig::Http {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            device_update: UpdateVerb::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::http("http://localhost:5000/api")
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Interval in seconds between background refreshes
    pub refresh_interval_secs: u64,
    /// Tab shown when the dashboard opens
    pub initial_tab: Tab,
    /// Maximum number of access log entries fetched for the logs tab
    pub log_limit: Option<u32>,
    /// Shared password asked before the panel opens
    pub password: Option<String>,
}

impl PanelConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 5,
            initial_tab: Tab::Devices,
            log_limit: Some(100),
            password: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
