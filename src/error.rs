//! Error types shared across the crate.

use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a payload from a station endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid station url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("station responded with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("response body is not a JSON object")]
    NotAnObject,

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

/// Failure of a historical trend query.
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("No database configuration found for station: {0}")]
    UnknownStation(String),

    #[error("Invalid type requested: {0}")]
    UnknownType(String),

    #[error("Please specify at least one filter: last24hours, last30days, or last365days")]
    NoFilter,

    #[error("history read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history decode failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("history reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TrendError {
    /// Whether the caller asked for something that does not exist, as
    /// opposed to the store failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TrendError::UnknownStation(_) | TrendError::UnknownType(_) | TrendError::NoFilter
        )
    }
}
