use anyhow::{Context, Result};
use reward_distribution::PayoutSettings;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

/// Configuration for the payout CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub payout: PayoutSettings,
    pub service: ServiceConfig,
}

/// Endpoints of the node, signer and indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub node_url: String,
    pub signer_url: String,
    pub indexer_url: String,
    /// Receives every finished payout report as JSON
    pub notify_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_url: "http://127.0.0.1:8732".to_string(),
            signer_url: "http://127.0.0.1:6732".to_string(),
            indexer_url: "https://api.tzkt.io".to_string(),
            notify_url: None,
        }
    }
}

/// Timing of the `serve` loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub tick_interval_secs: u64,
    pub cycle_poll_interval_secs: u64,
    /// Cycles to wait after a cycle ends before paying it
    pub cycle_offset: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            cycle_poll_interval_secs: 120,
            cycle_offset: 1,
        }
    }
}

impl ServiceConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn cycle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_poll_interval_secs)
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_default()
            .join("tzpay")
            .join("config.toml")
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A default file is written when the default location is empty.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if !config_path.exists() {
            if path.is_some() {
                anyhow::bail!("config file {} not found", config_path.display());
            }
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        let config_str = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config = toml::from_str::<Config>(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;

        Ok(())
    }

    /// Checks everything a command needs before talking to the network.
    pub fn validate(&self) -> Result<()> {
        self.payout.check()?;

        for (name, value) in [
            ("node_url", &self.network.node_url),
            ("signer_url", &self.network.signer_url),
            ("indexer_url", &self.network.indexer_url),
        ] {
            Url::parse(value).with_context(|| format!("invalid {name} {value:?}"))?;
        }
        if let Some(notify) = &self.network.notify_url {
            Url::parse(notify).with_context(|| format!("invalid notify_url {notify:?}"))?;
        }

        if self.service.tick_interval_secs == 0 || self.service.cycle_poll_interval_secs == 0 {
            anyhow::bail!("service intervals must be at least one second");
        }

        Ok(())
    }
}
