//! In-memory table of station readings.
//!
//! Each station has its own lock, so updates to one station are serialized
//! while different stations never contend beyond the brief map lookup.
//! Callers only ever get clones; the live readings stay inside the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::reading::StationReading;

/// Result of [`StationStateStore::upsert`].
#[derive(Debug, Clone)]
pub struct Upsert {
    /// State before the update; `None` if the record was created by this call.
    pub previous: Option<StationReading>,
    pub current: StationReading,
}

impl Upsert {
    pub fn is_first_contact(&self) -> bool {
        self.previous.is_none()
    }
}

#[derive(Debug, Default)]
pub struct StationStateStore {
    stations: RwLock<HashMap<String, Arc<Mutex<StationReading>>>>,
}

impl StationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, station: &str) -> Option<StationReading> {
        let stations = self.stations.read().unwrap_or_else(PoisonError::into_inner);
        stations
            .get(station)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Applies `update` to the station's reading, creating a default record
    /// first if the station has never been seen.
    pub fn upsert<F>(&self, station: &str, update: F) -> Upsert
    where
        F: FnOnce(&mut StationReading),
    {
        let (slot, created) = self.slot(station);
        let mut reading = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = if created { None } else { Some(reading.clone()) };
        update(&mut *reading);
        Upsert {
            previous,
            current: reading.clone(),
        }
    }

    /// Copies of every reading, keyed by station name.
    pub fn snapshot(&self) -> BTreeMap<String, StationReading> {
        let stations = self.stations.read().unwrap_or_else(PoisonError::into_inner);
        stations
            .iter()
            .map(|(name, slot)| {
                let reading = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
                (name.clone(), reading)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stations.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, station: &str) -> (Arc<Mutex<StationReading>>, bool) {
        {
            let stations = self.stations.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = stations.get(station) {
                return (slot.clone(), false);
            }
        }

        let mut stations = self.stations.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted between the two locks.
        if let Some(slot) = stations.get(station) {
            return (slot.clone(), false);
        }
        let slot = Arc::new(Mutex::new(StationReading::default()));
        stations.insert(station.to_string(), slot.clone());
        (slot, true)
    }
}
