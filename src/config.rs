// src/config.rs

use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

use crate::extract::FieldNames;
use crate::fetch::urls::PageUrls;

/// Placeholder substituted with the page index in `source.url_template`.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Everything the pipeline needs, grouped per component. Every field has a
/// default, so a YAML file only has to name what it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub harvest: HarvestConfig,
    pub store: StoreConfig,
    pub animation: AnimationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url_template: String,
    pub fields: FieldNames,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template:
                "http://data.treasury.gov/Feed.svc/DailyTreasuryYieldCurveRateData({index})"
                    .to_string(),
            fields: FieldNames::default(),
            request_timeout_secs: 30,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// First index to probe. When unset it is derived from the stored row count.
    pub start_index: Option<u64>,
    /// Inclusive upper bound on probed indices.
    pub end_index: u64,
    /// Added to the stored row count to get the derived start index.
    pub index_offset: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            start_index: None,
            end_index: 10_000,
            index_offset: 3,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl HarvestConfig {
    pub fn start_for(&self, stored_rows: usize) -> u64 {
        self.start_index
            .unwrap_or(stored_rows as u64 + self.index_offset)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("treasury_yields.csv"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub begin_date: NaiveDate,
    /// Frames per second.
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            begin_date: NaiveDate::from_ymd_opt(1990, 1, 2).unwrap_or_default(),
            frame_rate: 5.0,
            width: 1000,
            height: 800,
            output: PathBuf::from("yield_curve.gif"),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config: Config = serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                info!(path = %path.display(), "loaded config");
                config
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.source.url_template.contains(INDEX_PLACEHOLDER),
            "source.url_template must contain {}",
            INDEX_PLACEHOLDER
        );
        PageUrls::new(&self.source.url_template)
            .page(1)
            .with_context(|| format!("source.url_template `{}` is not a valid URL", self.source.url_template))?;
        if let Err(msg) = self.source.fields.validate() {
            bail!("source.fields: {}", msg);
        }
        ensure!(self.harvest.end_index >= 1, "harvest.end_index must be at least 1");
        ensure!(
            self.animation.frame_rate.is_finite() && self.animation.frame_rate > 0.0,
            "animation.frame_rate must be a positive number, got {}",
            self.animation.frame_rate
        );
        ensure!(
            self.animation.width > 0 && self.animation.height > 0,
            "animation canvas must be non-empty"
        );
        Ok(())
    }
}
