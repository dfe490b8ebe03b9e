//! The poll cycle: fetch every station, update the store, publish changes.
//!
//! Each tick fans out one fetch task per station, waits for all of them, then
//! applies the outcomes to the store one station at a time. A failing station
//! only ever affects its own reading.

use chrono::{DateTime, Local, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, warn};

use crate::broadcast::{ChangeBroadcaster, StationUpdate};
use crate::diff::shallow_diff;
use crate::error::FetchError;
use crate::fetch::{HttpClient, fetch_payload};
use crate::freshness::Thresholds;
use crate::store::{StationStateStore, Upsert};
use crate::validator::{RawPayload, Validation, validate_fetch};

/// A configured station endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub url: String,
}

/// Counters for one tick, used for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub polled: usize,
    pub valid: usize,
    pub invalid: usize,
    pub published: usize,
}

pub struct PollCycle<C, B> {
    stations: Vec<Station>,
    client: Arc<C>,
    store: Arc<StationStateStore>,
    broadcaster: Arc<B>,
    thresholds: Thresholds,
    fetch_timeout: Duration,
}

impl<C, B> PollCycle<C, B>
where
    C: HttpClient + 'static,
    B: ChangeBroadcaster,
{
    pub fn new(
        stations: Vec<Station>,
        client: Arc<C>,
        store: Arc<StationStateStore>,
        broadcaster: Arc<B>,
        thresholds: Thresholds,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            stations,
            client,
            store,
            broadcaster,
            thresholds,
            fetch_timeout,
        }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Runs one tick against the local wall clock.
    pub async fn tick(&self) -> TickSummary {
        let outcomes = self.fetch_all().await;
        self.apply_all(outcomes, &Local::now())
    }

    /// Runs one tick, classifying as if the current time were `now`.
    pub async fn tick_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> TickSummary {
        let outcomes = self.fetch_all().await;
        self.apply_all(outcomes, &now)
    }

    /// Ticks every `period` until `shutdown` resolves. A tick always runs to
    /// completion before the next one starts; overdue ticks are skipped.
    pub async fn run<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            stations = self.stations.len(),
            period_ms = period.as_millis() as u64,
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Poll loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    let summary = self.tick().await;
                    debug!(
                        polled = summary.polled,
                        valid = summary.valid,
                        invalid = summary.invalid,
                        published = summary.published,
                        "Tick complete"
                    );
                }
            }
        }
    }

    /// Fetches every station concurrently. Results come back in station
    /// order; a panicked task counts as a failed fetch.
    async fn fetch_all(&self) -> Vec<(String, Result<RawPayload, FetchError>)> {
        let mut tasks = Vec::with_capacity(self.stations.len());

        for station in &self.stations {
            let client = self.client.clone();
            let url = station.url.clone();
            let timeout = self.fetch_timeout;
            let span = tracing::info_span!("station", station = %station.name);

            let task = tokio::spawn(
                async move {
                    let started = Instant::now();
                    let result = fetch_payload(client.as_ref(), &url, timeout).await;
                    let elapsed = started.elapsed();
                    if elapsed > timeout / 2 {
                        warn!(elapsed_ms = elapsed.as_millis() as u64, "Station fetch was slow");
                    }
                    result
                }
                .instrument(span),
            );
            tasks.push((station.name.clone(), task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let result = task
                .await
                .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())));
            outcomes.push((name, result));
        }
        outcomes
    }

    fn apply_all<Tz: TimeZone>(
        &self,
        outcomes: Vec<(String, Result<RawPayload, FetchError>)>,
        now: &DateTime<Tz>,
    ) -> TickSummary {
        let mut summary = TickSummary::default();
        for (name, result) in outcomes {
            let _span = tracing::info_span!("station", station = %name).entered();
            let validation = validate_fetch(&result);
            summary.polled += 1;
            if validation.is_valid() {
                summary.valid += 1;
            } else {
                summary.invalid += 1;
            }
            if self.apply_validation(&name, validation, now).is_some() {
                summary.published += 1;
            }
        }
        summary
    }

    /// Runs one station's fetch result through validation and the freshness
    /// state machine, then publishes whatever clients need to see.
    pub fn apply_outcome<Tz: TimeZone>(
        &self,
        station: &str,
        result: &Result<RawPayload, FetchError>,
        now: &DateTime<Tz>,
    ) -> Option<StationUpdate> {
        self.apply_validation(station, validate_fetch(result), now)
    }

    fn apply_validation<Tz: TimeZone>(
        &self,
        station: &str,
        validation: Validation,
        now: &DateTime<Tz>,
    ) -> Option<StationUpdate> {
        let now_utc = now.with_timezone(&Utc);
        let thresholds = self.thresholds;

        let upsert = match validation {
            Validation::Valid(payload) => {
                let observed_at = payload.observed_at(now);
                self.store.upsert(station, |reading| {
                    reading.mark_valid(payload.into_fields(), observed_at, now_utc, &thresholds)
                })
            }
            Validation::Invalid(reason) => {
                warn!(station, reason = %reason, "Station poll invalid");
                self.store
                    .upsert(station, |reading| reading.mark_invalid(now_utc, &thresholds))
            }
        };

        log_transition(station, &upsert);

        let update = station_update(&upsert)?;
        self.broadcaster.publish_diff(station, update.clone());
        Some(update)
    }
}

/// What clients should receive for an upsert: the full reading on first
/// contact, otherwise the changed fields, or nothing if nothing changed.
pub fn station_update(upsert: &Upsert) -> Option<StationUpdate> {
    match &upsert.previous {
        None => Some(StationUpdate::Full(upsert.current.to_wire())),
        Some(previous) => {
            let changed = shallow_diff(&previous.to_wire(), &upsert.current.to_wire());
            (!changed.is_empty()).then_some(StationUpdate::Diff(changed))
        }
    }
}

fn log_transition(station: &str, upsert: &Upsert) {
    let to = upsert.current.status();
    match &upsert.previous {
        None => info!(station, status = %to, "Station first seen"),
        Some(previous) if previous.status() != to => {
            info!(station, from = %previous.status(), to = %to, "Station status changed")
        }
        Some(_) => {}
    }
}
