//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Publishing is fire-and-forget: handlers publish after a successful write
//! and never wait on subscribers.

use chrono::{DateTime, Utc};
use flowsmith_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ActivityEvent
// ---------------------------------------------------------------------------

/// Something a user did to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Entity kind, e.g. `"workflow"` or `"node_definition"`.
    pub entity_type: String,
    pub entity_id: DbId,
    /// What happened, e.g. `"auto_saved"`.
    pub action: String,
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(entity_type: impl Into<String>, entity_id: DbId, action: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Dot-separated name, e.g. `"workflow.saved"`.
    pub fn event_type(&self) -> String {
        format!("{}.{}", self.entity_type, self.action)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus, shared as `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<ActivityEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when there are
    /// none.
    pub fn publish(&self, event: ActivityEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            ActivityEvent::new("workflow", 42, "saved")
                .with_actor(7)
                .with_payload(serde_json::json!({"nodes": 3})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type(), "workflow.saved");
        assert_eq!(received.entity_id, 42);
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.payload["nodes"], 3);
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(ActivityEvent::new("node_definition", 1, "versioned"));

        assert_eq!(rx1.recv().await.unwrap().action, "versioned");
        assert_eq!(rx2.recv().await.unwrap().action, "versioned");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        EventBus::default().publish(ActivityEvent::new("workflow", 1, "archived"));
    }
}
