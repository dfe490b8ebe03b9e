//! Freshness classification for station readings.
//!
//! A station's health is derived only from how long ago its last valid
//! observation was made. The two thresholds are configurable.

use serde::{Deserialize, Serialize};

/// Default upper bound (inclusive) for a `green` station, in seconds.
pub const CHECK_INTERVAL_SECONDS: i64 = 60;

/// Default upper bound (inclusive) for an `orange` station, in seconds.
pub const STALE_THRESHOLD_SECONDS: i64 = 300;

/// Health of a station as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Orange,
    Red,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Green => "green",
            Status::Orange => "orange",
            Status::Red => "red",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds used by [`Thresholds::classify`].
///
/// | Elapsed (s)                       | Status |
/// |-----------------------------------|--------|
/// | `<= check_interval`               | green  |
/// | `<= stale_threshold`              | orange |
/// | `>  stale_threshold` or no data   | red    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub check_interval_secs: i64,
    pub stale_threshold_secs: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            check_interval_secs: CHECK_INTERVAL_SECONDS,
            stale_threshold_secs: STALE_THRESHOLD_SECONDS,
        }
    }
}

impl Thresholds {
    pub fn new(check_interval_secs: i64, stale_threshold_secs: i64) -> Self {
        Self {
            check_interval_secs,
            stale_threshold_secs,
        }
    }

    /// Maps whole seconds since the last valid reading to a [`Status`].
    ///
    /// `None` means no valid reading was ever recorded and is treated as
    /// older than the stale threshold. Negative values (station clock ahead
    /// of ours) count as fresh.
    pub fn classify(&self, elapsed_secs: Option<i64>) -> Status {
        match elapsed_secs {
            None => Status::Red,
            Some(e) if e <= self.check_interval_secs => Status::Green,
            Some(e) if e <= self.stale_threshold_secs => Status::Orange,
            Some(_) => Status::Red,
        }
    }
}
