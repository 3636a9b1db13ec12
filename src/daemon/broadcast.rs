//! Fan-out of timer snapshots to attached consumers.
//!
//! Delivery is best-effort: a consumer whose channel is closed is dropped
//! on the next publish and never blocks the others.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::Snapshot;

/// Identifier of an attached consumer.
pub type ConsumerId = u64;

struct Consumer {
    label: String,
    tx: mpsc::UnboundedSender<Snapshot>,
}

/// Registry of consumers plus the monotonic snapshot stamp.
#[derive(Default)]
pub struct BroadcastHub {
    consumers: HashMap<ConsumerId, Consumer>,
    next_id: ConsumerId,
    last_timestamp: i64,
}

impl BroadcastHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a consumer and returns its id and update stream.
    pub fn attach(&mut self, label: impl Into<String>) -> (ConsumerId, mpsc::UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.next_id += 1;
        let id = self.next_id;
        let label = label.into();
        debug!("Consumer {} ({}) attached", id, label);
        self.consumers.insert(id, Consumer { label, tx });
        (id, rx)
    }

    /// Detaches a consumer. Returns false if it was not attached.
    pub fn detach(&mut self, id: ConsumerId) -> bool {
        match self.consumers.remove(&id) {
            Some(consumer) => {
                debug!("Consumer {} ({}) detached", id, consumer.label);
                true
            }
            None => false,
        }
    }

    /// Number of attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Assigns a timestamp strictly greater than any previous one.
    pub fn stamp(&mut self, snapshot: &mut Snapshot) {
        let timestamp = snapshot.timestamp.max(self.last_timestamp + 1);
        snapshot.timestamp = timestamp;
        self.last_timestamp = timestamp;
    }

    /// Stamps `snapshot` in place and delivers it to every consumer.
    ///
    /// Returns the number of consumers that received it.
    pub fn publish(&mut self, snapshot: &mut Snapshot) -> usize {
        self.stamp(snapshot);

        let mut gone = Vec::new();
        for (id, consumer) in &self.consumers {
            if consumer.tx.send(snapshot.clone()).is_err() {
                gone.push(*id);
            }
        }
        for id in &gone {
            self.detach(*id);
        }

        self.consumers.len()
    }
}

/// Consumer-side holder of the most recent snapshot.
///
/// Snapshots that arrive out of order are discarded by timestamp.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    latest: Option<Snapshot>,
}

impl SnapshotCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `snapshot` if it is newer than the cached one.
    pub fn accept(&mut self, snapshot: Snapshot) -> bool {
        if let Some(latest) = &self.latest {
            if snapshot.timestamp <= latest.timestamp {
                return false;
            }
        }
        self.latest = Some(snapshot);
        true
    }

    /// Returns the most recent snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }
}
