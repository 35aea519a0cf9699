/*
[INPUT]:  YAML configuration file plus TINVEST_* environment overrides
[OUTPUT]: Parsed stream configuration (token, endpoint, subscriptions)
[POS]:    Configuration layer - runner setup
[UPDATE]: When adding new configuration options or channels
*/

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tinvest_adapter::ws::{DEFAULT_ORDERBOOK_DEPTH, PRODUCTION_STREAM_URL};
use tinvest_adapter::{CandleInterval, StreamingConfig, SubscriptionKey};

/// Environment variables with this prefix override file values,
/// e.g. `TINVEST_TOKEN` or `TINVEST_STREAM_URL`.
pub const ENV_PREFIX: &str = "TINVEST";

/// Top-level configuration for the stream runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// OpenAPI access token
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Seconds between metrics summaries
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// One streaming channel to subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionConfig {
    Orderbook {
        figi: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<u32>,
    },
    Candle {
        figi: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<CandleInterval>,
    },
    InstrumentInfo {
        figi: String,
    },
}

impl SubscriptionConfig {
    pub fn key(&self) -> SubscriptionKey {
        match self {
            SubscriptionConfig::Orderbook { figi, depth } => {
                SubscriptionKey::orderbook(figi.clone(), depth.unwrap_or(DEFAULT_ORDERBOOK_DEPTH))
            }
            SubscriptionConfig::Candle { figi, interval } => {
                SubscriptionKey::candle(figi.clone(), interval.clone().unwrap_or_default())
            }
            SubscriptionConfig::InstrumentInfo { figi } => SubscriptionKey::instrument_info(figi.clone()),
        }
    }
}

fn default_stream_url() -> String {
    PRODUCTION_STREAM_URL.to_string()
}

fn default_report_interval_secs() -> u64 {
    60
}

impl StreamConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("read config {}", path.display()))?;

        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without environment overrides
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("parse yaml config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.trim().is_empty() {
            bail!("token is empty; set it in the config file or via {ENV_PREFIX}_TOKEN");
        }
        if self.subscriptions.is_empty() {
            bail!("no subscriptions configured");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be positive");
        }
        self.streaming_config()?;

        for (index, subscription) in self.subscriptions.iter().enumerate() {
            if subscription.key().figi().trim().is_empty() {
                bail!("subscription #{index} has an empty figi");
            }
        }
        Ok(())
    }

    pub fn streaming_config(&self) -> anyhow::Result<StreamingConfig> {
        StreamingConfig::new(&self.stream_url, self.token.clone())
            .with_context(|| format!("invalid stream_url {}", self.stream_url))
    }
}
