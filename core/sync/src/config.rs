//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use moviesync_common::{Error, Result};

use crate::scheduler::SyncMode;

/// Settings for a sync client.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Root of the movie service API.
    pub base_url: String,
    /// Directory holding the persisted mirror and pending log.
    pub data_dir: PathBuf,
    /// Seconds between connectivity probes.
    pub probe_interval_secs: u64,
    pub sync_mode: SyncMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/".to_string(),
            data_dir: default_data_dir(),
            probe_interval_secs: 30,
            sync_mode: SyncMode::Manual,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moviesync")
}

impl ClientConfig {
    /// Read a JSON config file. Keys it lacks keep their defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file if it exists, defaults otherwise.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if tokio::fs::try_exists(path.as_ref()).await? {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if self.probe_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "Probe interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
