/// Client configuration, loaded from a JSON file
use crate::error::SyncError;
use crate::request::CustomizationLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL the `sessions/`, `scheduler/` and `api/` paths are joined onto
    pub api_base_url: String,
    /// Quiet period before a term's cards are saved
    pub autosave_delay_ms: u64,
    pub customization_level: CustomizationLevel,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/".to_string(),
            autosave_delay_ms: 15_000,
            customization_level: CustomizationLevel::Section,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: concat!("coursesync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl SyncConfig {
    /// Loads a config file; fields it leaves out keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path).map_err(|e| SyncError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        let config: SyncConfig = serde_json::from_str(&content).map_err(|e| SyncError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.autosave_delay_ms == 0 {
            return Err(SyncError::Config {
                message: "autosave_delay_ms must be greater than zero".to_string(),
            });
        }
        self.base_url()?;
        Ok(())
    }

    /// The API base URL, normalized to end in `/` so relative joins append.
    pub fn base_url(&self) -> Result<Url, SyncError> {
        let mut base = self.api_base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
