use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget event publication. Delivery is never awaited.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Broadcast hub for one tenant: a firehose plus per-subject channels
/// (vehicle or driver id).
pub struct NotifyHub {
    all: broadcast::Sender<Event>,
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            channels: DashMap::new(),
        }
    }

    /// Every event for the tenant.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Events about one subject. Creates the channel if needed.
    pub fn subscribe(&self, subject_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(subject_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Drop a subject channel (e.g. when a vehicle is retired).
    pub fn remove(&self, subject_id: &Ulid) {
        self.channels.remove(subject_id);
    }
}

impl NotificationSink for NotifyHub {
    /// No-op if nobody is listening. A subject channel whose receivers have
    /// all been dropped is removed here.
    fn publish(&self, event: Event) {
        metrics::counter!(crate::observability::NOTIFICATIONS_PUBLISHED_TOTAL, "kind" => event.label())
            .increment(1);
        let subject = event.subject_id();
        let orphaned = self
            .channels
            .get(&subject)
            .is_some_and(|sender| sender.send(event.clone()).is_err());
        if orphaned {
            // Re-checked under the shard write lock; a racing subscribe keeps it.
            self.channels.remove_if(&subject, |_, sender| sender.receiver_count() == 0);
        }
        let _ = self.all.send(event);
    }
}
