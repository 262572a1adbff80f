//! Shared access to a replica's event log
//!
//! The event log client is enabled while at least one subscription is alive. Every
//! batch it produces is delivered to all live subscriptions.

use duplex_types::{EventLogChangeType, EventLogClient, EventLogEntry};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A batch of event log entries
pub type EventLogBatch = Arc<Vec<EventLogEntry>>;

struct Shared {
    client: Arc<dyn EventLogClient>,
    sender: broadcast::Sender<EventLogBatch>,
    subscribers: Mutex<usize>,
}

/// Reference-counted subscriptions to one event log
#[derive(Clone)]
pub struct EventLogSubscriptions {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EventLogSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogSubscriptions")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl EventLogSubscriptions {
    /// Wrap `client`; up to `capacity` batches are buffered per subscriber
    pub fn new(client: Arc<dyn EventLogClient>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                client,
                sender,
                subscribers: Mutex::new(0),
            }),
        }
    }

    /// Subscribe to the event log, enabling it for the first subscriber
    pub fn subscribe(&self) -> EventLogSubscription {
        let mut subscribers = self.shared.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.shared.sender.subscribe();
        *subscribers += 1;
        if *subscribers == 1 {
            let sender = self.shared.sender.clone();
            self.shared.client.enable(Box::new(move |entries| {
                // No receiver means every subscription was dropped meanwhile
                let _ = sender.send(Arc::new(entries));
            }));
            info!("Event log enabled");
        }
        EventLogSubscription {
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        *self.shared.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription; dropping the last one disables the event log
pub struct EventLogSubscription {
    receiver: broadcast::Receiver<EventLogBatch>,
    shared: Arc<Shared>,
}

impl EventLogSubscription {
    /// Next batch of entries. A subscriber that fell behind receives a batch holding a
    /// single `Skipped` entry in place of the batches it missed.
    pub async fn next_batch(&mut self) -> Option<EventLogBatch> {
        match self.receiver.recv().await {
            Ok(batch) => Some(batch),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event log subscriber missed {} batch(es)", missed);
                Some(Arc::new(vec![EventLogEntry::new(EventLogChangeType::Skipped)]))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for EventLogSubscription {
    fn drop(&mut self) {
        let mut subscribers = self.shared.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        *subscribers = subscribers.saturating_sub(1);
        if *subscribers == 0 {
            self.shared.client.disable();
            info!("Event log disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_types::EventLogSink;

    #[derive(Default)]
    struct RecordingClient {
        sink: Mutex<Option<EventLogSink>>,
        enabled: Mutex<usize>,
        disabled: Mutex<usize>,
    }

    impl RecordingClient {
        fn emit(&self, entries: Vec<EventLogEntry>) {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                sink(entries);
            }
        }
    }

    impl EventLogClient for RecordingClient {
        fn enable(&self, sink: EventLogSink) {
            *self.sink.lock().unwrap() = Some(sink);
            *self.enabled.lock().unwrap() += 1;
        }

        fn disable(&self) {
            *self.sink.lock().unwrap() = None;
            *self.disabled.lock().unwrap() += 1;
        }
    }

    fn entry(change_type: EventLogChangeType) -> EventLogEntry {
        EventLogEntry::new(change_type)
    }

    #[tokio::test]
    async fn test_first_subscriber_enables_last_disables() {
        let client = Arc::new(RecordingClient::default());
        let subscriptions = EventLogSubscriptions::new(client.clone(), 8);

        let first = subscriptions.subscribe();
        let second = subscriptions.subscribe();
        assert_eq!(*client.enabled.lock().unwrap(), 1);
        assert_eq!(subscriptions.subscriber_count(), 2);

        drop(first);
        assert_eq!(*client.disabled.lock().unwrap(), 0);
        drop(second);
        assert_eq!(*client.disabled.lock().unwrap(), 1);

        let _third = subscriptions.subscribe();
        assert_eq!(*client.enabled.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batches_reach_every_subscriber() {
        let client = Arc::new(RecordingClient::default());
        let subscriptions = EventLogSubscriptions::new(client.clone(), 8);
        let mut first = subscriptions.subscribe();
        let mut second = subscriptions.subscribe();

        client.emit(vec![entry(EventLogChangeType::Created)]);
        assert_eq!(first.next_batch().await.unwrap()[0].change_type, EventLogChangeType::Created);
        assert_eq!(second.next_batch().await.unwrap()[0].change_type, EventLogChangeType::Created);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_skipped_marker() {
        let client = Arc::new(RecordingClient::default());
        let subscriptions = EventLogSubscriptions::new(client.clone(), 1);
        let mut subscription = subscriptions.subscribe();

        client.emit(vec![entry(EventLogChangeType::Created)]);
        client.emit(vec![entry(EventLogChangeType::Deleted)]);
        let batch = subscription.next_batch().await.unwrap();
        assert_eq!(batch[0].change_type, EventLogChangeType::Skipped);
        let batch = subscription.next_batch().await.unwrap();
        assert_eq!(batch[0].change_type, EventLogChangeType::Deleted);
    }
}
