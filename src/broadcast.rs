//! Change propagation to connected clients.
//!
//! [`ChangeBroadcaster`] is the seam between the poll loop and whatever
//! transport carries events. [`ChannelBroadcaster`] is the in-process
//! implementation on top of a `tokio::sync::broadcast` channel; the
//! WebSocket server drains one [`Subscription`] per client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::store::StationStateStore;

/// Station name → flat wire view of its reading.
pub type Snapshot = BTreeMap<String, Map<String, Value>>;

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 256;

/// Event delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum NotifierEvent {
    /// Complete readings for one or more stations.
    FullState(Snapshot),
    /// Only the fields that changed, per station.
    StateDiff(Snapshot),
}

/// What one poll of one station produced for clients.
#[derive(Debug, Clone, PartialEq)]
pub enum StationUpdate {
    Full(Map<String, Value>),
    Diff(Map<String, Value>),
}

impl StationUpdate {
    pub fn into_event(self, station: &str) -> NotifierEvent {
        match self {
            StationUpdate::Full(fields) => {
                NotifierEvent::FullState(BTreeMap::from([(station.to_string(), fields)]))
            }
            StationUpdate::Diff(fields) => {
                NotifierEvent::StateDiff(BTreeMap::from([(station.to_string(), fields)]))
            }
        }
    }
}

pub trait ChangeBroadcaster: Send + Sync {
    type Subscriber;

    /// Fire-and-forget delivery to every current subscriber.
    fn publish_diff(&self, station: &str, update: StationUpdate);

    /// Queues the full state for one subscriber, ahead of any later diff.
    fn publish_snapshot_to(&self, subscriber: &mut Self::Subscriber, snapshot: Snapshot);
}

/// Wire view of every station in the store.
pub fn wire_snapshot(store: &StationStateStore) -> Snapshot {
    store
        .snapshot()
        .into_iter()
        .map(|(name, reading)| (name, reading.to_wire()))
        .collect()
}

pub struct ChannelBroadcaster {
    tx: broadcast::Sender<NotifierEvent>,
    store: Arc<StationStateStore>,
}

impl ChannelBroadcaster {
    pub fn new(store: Arc<StationStateStore>) -> Self {
        Self::with_capacity(store, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(store: Arc<StationStateStore>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, store }
    }

    /// Registers a new subscriber and seeds it with the current state.
    ///
    /// The live receiver is created before the snapshot is taken, so no
    /// change can fall between the two.
    pub fn connect(&self) -> Subscription {
        let mut subscription = Subscription {
            backlog: VecDeque::new(),
            live: self.tx.subscribe(),
            store: self.store.clone(),
        };
        self.publish_snapshot_to(&mut subscription, wire_snapshot(&self.store));
        subscription
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ChangeBroadcaster for ChannelBroadcaster {
    type Subscriber = Subscription;

    fn publish_diff(&self, station: &str, update: StationUpdate) {
        if self.tx.send(update.into_event(station)).is_err() {
            debug!(station, "No subscribers, update dropped");
        }
    }

    fn publish_snapshot_to(&self, subscriber: &mut Subscription, snapshot: Snapshot) {
        subscriber
            .backlog
            .push_back(NotifierEvent::FullState(snapshot));
    }
}

/// One client's view of the event stream.
pub struct Subscription {
    backlog: VecDeque<NotifierEvent>,
    live: broadcast::Receiver<NotifierEvent>,
    store: Arc<StationStateStore>,
}

impl Subscription {
    /// Next event for this client; `None` once the broadcaster is gone.
    ///
    /// A subscriber that fell behind the channel buffer gets a fresh
    /// `full-state` instead of the diffs it missed. Events still buffered at
    /// that point are already covered by the snapshot and are dropped.
    pub async fn next(&mut self) -> Option<NotifierEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        match self.live.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                let stale = self.drain_buffered();
                warn!(skipped, stale, "Subscriber lagged, resending full state");
                Some(NotifierEvent::FullState(wire_snapshot(&self.store)))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Discards everything currently queued; returns how many events went.
    fn drain_buffered(&mut self) -> u64 {
        let mut dropped = 0;
        loop {
            match self.live.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Lagged(n)) => dropped += n,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return dropped,
            }
        }
    }
}
