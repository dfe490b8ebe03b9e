//! Service settings.
//!
//! Loaded from a JSON file and then overridden by environment variables:
//!
//! ```json
//! {
//!   "stations": {
//!     "Skodje": "http://10.0.0.10/wx.json",
//!     "Longva": "http://10.0.0.12/wx.json"
//!   },
//!   "stale_threshold_seconds": 300
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::freshness::{CHECK_INTERVAL_SECONDS, STALE_THRESHOLD_SECONDS, Thresholds};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Station name → endpoint URL.
    pub stations: BTreeMap<String, String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: i64,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_seconds: i64,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_check_interval() -> i64 {
    CHECK_INTERVAL_SECONDS
}

fn default_stale_threshold() -> i64 {
    STALE_THRESHOLD_SECONDS
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Settings {
    /// Reads `path`, applies process environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let mut settings = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Applies `CHECK_INTERVAL_SECONDS`, `STALE_THRESHOLD_SECONDS`,
    /// `TICK_MILLIS`, `FETCH_TIMEOUT_SECONDS`, `HISTORY_DIR` and `PORT`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHECK_INTERVAL_SECONDS") {
            self.check_interval_seconds = parse_var("CHECK_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("STALE_THRESHOLD_SECONDS") {
            self.stale_threshold_seconds = parse_var("STALE_THRESHOLD_SECONDS", &v)?;
        }
        if let Some(v) = lookup("TICK_MILLIS") {
            self.tick_millis = parse_var("TICK_MILLIS", &v)?;
        }
        if let Some(v) = lookup("FETCH_TIMEOUT_SECONDS") {
            self.fetch_timeout_seconds = parse_var("FETCH_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("HISTORY_DIR") {
            self.history_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PORT") {
            let port: u16 = parse_var("PORT", &v)?;
            let host = self
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("0.0.0.0");
            self.bind = format!("{host}:{port}");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.stations.is_empty() {
            bail!("at least one station must be configured");
        }
        if self.check_interval_seconds < 0 {
            bail!("check_interval_seconds must not be negative");
        }
        if self.check_interval_seconds >= self.stale_threshold_seconds {
            bail!(
                "check_interval_seconds ({}) must be below stale_threshold_seconds ({})",
                self.check_interval_seconds,
                self.stale_threshold_seconds
            );
        }
        if self.tick_millis == 0 {
            bail!("tick_millis must be non-zero");
        }
        if self.fetch_timeout_seconds == 0 {
            bail!("fetch_timeout_seconds must be non-zero");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.check_interval_seconds, self.stale_threshold_seconds)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn is_known_station(&self, station: &str) -> bool {
        self.stations.contains_key(station)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {name}: '{value}'"))
}
