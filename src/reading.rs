//! Per-station reading model.
//!
//! A [`StationReading`] is the last known state of one station: its metric
//! values plus the bookkeeping that drives the freshness status. Status and
//! time fields can only change through [`StationReading::mark_valid`] and
//! [`StationReading::mark_invalid`], so the status is always derived from
//! elapsed time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::freshness::{Status, Thresholds};

/// Wire key for the freshness status.
pub const STATUS_KEY: &str = "status";

/// A single metric value as reported by a station.
///
/// Some firmware reports composite strings (e.g. a "last update" text)
/// instead of numbers, so both shapes are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// Last known state of one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReading {
    fields: BTreeMap<String, FieldValue>,
    last_valid_time: Option<DateTime<Utc>>,
    last_invalid_time: Option<DateTime<Utc>>,
    status: Status,
}

impl Default for StationReading {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            last_valid_time: None,
            last_invalid_time: None,
            status: Status::Red,
        }
    }
}

impl StationReading {
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn last_valid_time(&self) -> Option<DateTime<Utc>> {
        self.last_valid_time
    }

    pub fn last_invalid_time(&self) -> Option<DateTime<Utc>> {
        self.last_invalid_time
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Whole seconds between the last valid observation and `now`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_valid_time.map(|t| (now - t).num_seconds())
    }

    /// Records a failed poll. Metric values are left untouched.
    ///
    /// The invalidity onset is only set on the first failure of a run.
    pub fn mark_invalid(&mut self, now: DateTime<Utc>, thresholds: &Thresholds) {
        if self.last_invalid_time.is_none() {
            self.last_invalid_time = Some(now);
        }
        self.status = thresholds.classify(self.elapsed_secs(now));
    }

    /// Records a successful poll: merges `fields` (text trimmed) and moves
    /// the last valid instant to `observed_at`.
    pub fn mark_valid(
        &mut self,
        fields: impl IntoIterator<Item = (String, FieldValue)>,
        observed_at: DateTime<Utc>,
        now: DateTime<Utc>,
        thresholds: &Thresholds,
    ) {
        self.last_invalid_time = None;
        for (key, value) in fields {
            let value = match value {
                FieldValue::Text(s) => FieldValue::Text(s.trim().to_string()),
                other => other,
            };
            self.fields.insert(key, value);
        }
        self.last_valid_time = Some(observed_at);
        self.status = thresholds.classify(self.elapsed_secs(now));
    }

    /// Flat JSON view sent to clients: metric fields plus `status`.
    ///
    /// Both instants stay internal. The observation time a client sees is
    /// the station's own `date` field, so a station reporting no usable time
    /// does not produce a change on every poll.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        map.insert(
            STATUS_KEY.to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        map
    }
}
