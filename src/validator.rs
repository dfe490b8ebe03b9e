//! Payload validation at the station boundary.
//!
//! Raw JSON objects from station firmware are turned into a
//! [`ValidPayload`] or rejected with an [`InvalidReason`]. Nothing downstream
//! sees the raw shape.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::FetchError;
use crate::reading::FieldValue;

/// Name of the wall-clock observation field (`HH:MM`).
pub const DATE_FIELD: &str = "date";

/// A station response body as decoded from JSON.
pub type RawPayload = Map<String, Value>;

/// Why a poll did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("payload has no 'date' field")]
    MissingDate,

    #[error("field '{0}' is null")]
    NullField(String),

    #[error("field '{0}' holds a nested value")]
    UnsupportedValue(String),
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPayload {
    fields: Vec<(String, FieldValue)>,
    date: Option<NaiveTime>,
}

impl ValidPayload {
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, FieldValue)> {
        self.fields
    }

    /// Parsed `HH:MM` observation time, if the `date` field was usable.
    pub fn date(&self) -> Option<NaiveTime> {
        self.date
    }

    /// Instant of the observation: the most recent past occurrence of the
    /// reported wall-clock time, or `now` when no usable time was reported.
    pub fn observed_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Utc> {
        self.date
            .and_then(|t| most_recent_occurrence(t, now))
            .unwrap_or_else(|| now.with_timezone(&Utc))
    }
}

/// Outcome of validating one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(ValidPayload),
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Classifies a decoded payload.
///
/// Empty strings are accepted. Booleans are kept as their text form.
pub fn validate(payload: &RawPayload) -> Validation {
    if !payload.contains_key(DATE_FIELD) {
        return Validation::Invalid(InvalidReason::MissingDate);
    }

    let mut fields = Vec::with_capacity(payload.len());
    for (key, value) in payload {
        let value = match value {
            Value::Null => return Validation::Invalid(InvalidReason::NullField(key.clone())),
            Value::Number(n) => match n.as_f64() {
                Some(n) => FieldValue::Number(n),
                None => return Validation::Invalid(InvalidReason::UnsupportedValue(key.clone())),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            Value::Array(_) | Value::Object(_) => {
                return Validation::Invalid(InvalidReason::UnsupportedValue(key.clone()));
            }
        };
        fields.push((key.clone(), value));
    }

    let date = payload
        .get(DATE_FIELD)
        .and_then(Value::as_str)
        .and_then(parse_clock);

    Validation::Valid(ValidPayload { fields, date })
}

/// Classifies the result of a fetch; a failed fetch is always invalid.
pub fn validate_fetch(result: &Result<RawPayload, FetchError>) -> Validation {
    match result {
        Ok(payload) => validate(payload),
        Err(e) => Validation::Invalid(InvalidReason::FetchFailed(e.to_string())),
    }
}

/// Parses an `HH:MM` wall-clock string.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Today at `time` in `now`'s zone, or yesterday if that is still in the
/// future. `None` if the local time does not exist (DST gap).
pub fn most_recent_occurrence<Tz: TimeZone>(
    time: NaiveTime,
    now: &DateTime<Tz>,
) -> Option<DateTime<Utc>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = tz.from_local_datetime(&today.and_time(time)).earliest()?;
    if candidate <= *now {
        return Some(candidate.with_timezone(&Utc));
    }
    let yesterday = today.pred_opt()?;
    tz.from_local_datetime(&yesterday.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}
