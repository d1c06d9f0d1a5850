//! In-process pub/sub broadcasting governance events to streaming
//! subscribers (C10). Grounded in the bounded-per-subscriber-queue,
//! drop-on-overflow design of the original action event bus.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of each subscriber's queue. A slow consumer starts losing
/// events once its queue backs up this far; it must catch up via the
/// audit-log query API.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Interval at which a stream consumer emits a keep-alive when no event
/// has arrived.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Broadcast payload for one evaluated or verified action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub event_type: String,
    pub tool: String,
    pub decision: String,
    pub risk_score: u8,
    pub explanation: String,
    #[serde(default)]
    pub policy_ids: Vec<String>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub channel: Option<String>,
    pub chain_pattern: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One item delivered by a [`Subscription`]'s stream.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(ActionEvent),
    Heartbeat,
}

/// Simple broadcast pub/sub over per-subscriber bounded queues.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<ActionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return a handle that owns its queue.
    /// Dropping the handle unsubscribes automatically.
    pub fn subscribe(&self) -> Subscription<'_> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = Uuid::new_v4();
        self.subscribers.write().insert(id, tx);
        Subscription {
            bus: self,
            id,
            rx,
        }
    }

    /// Idempotent: removing an id that is not present is a no-op.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().remove(&id);
    }

    /// Broadcast to every subscriber. Non-blocking: a full or closed queue
    /// is dropped silently rather than stalling the evaluation path.
    pub fn publish(&self, event: ActionEvent) {
        let subscribers = self.subscribers.read();
        for tx in subscribers.values() {
            if tx.try_send(event.clone()).is_err() {
                tracing::debug!(tool = %event.tool, "dropping event for slow or closed subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// An active subscription. Produces events as they're published and a
/// [`StreamItem::Heartbeat`] every [`HEARTBEAT_INTERVAL`] when idle.
pub struct Subscription<'a> {
    bus: &'a EventBus,
    id: Uuid,
    rx: mpsc::Receiver<ActionEvent>,
}

impl Subscription<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event or heartbeat. Returns `None` once the bus
    /// side has been dropped, which callers should treat as disconnection.
    pub async fn next(&mut self) -> Option<StreamItem> {
        tokio::select! {
            event = self.rx.recv() => event.map(StreamItem::Event),
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => Some(StreamItem::Heartbeat),
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(tool: &str) -> ActionEvent {
        ActionEvent {
            event_type: "action_evaluated".to_string(),
            tool: tool.to_string(),
            decision: "allow".to_string(),
            risk_score: 10,
            explanation: "ok".to_string(),
            policy_ids: vec![],
            agent_id: Some("agent-1".to_string()),
            session_id: None,
            user_id: None,
            channel: None,
            chain_pattern: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(sample_event("shell"));
        match sub.next().await {
            Some(StreamItem::Event(e)) => assert_eq!(e.tool, "shell"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_on_drop_stops_delivery() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        // publish after the only subscriber dropped must not panic
        bus.publish(sample_event("http_request"));
    }

    #[tokio::test]
    async fn full_queue_drops_events_without_blocking() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        for _ in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            bus.publish(sample_event("http_request"));
        }
        // draining should yield at most the queue capacity's worth of events
        let mut drained = 0;
        while let Ok(item) = sub.rx.try_recv() {
            let _ = item;
            drained += 1;
        }
        assert!(drained <= SUBSCRIBER_QUEUE_CAPACITY);
    }
}
