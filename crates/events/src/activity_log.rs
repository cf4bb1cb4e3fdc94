//! Activity log subscriber.
//!
//! [`ActivityLog`] drains the bus and writes one structured `info` record
//! per event. It stands in for an external activity sink and exits when the
//! bus is dropped.

use tokio::sync::broadcast;

use crate::bus::ActivityEvent;

pub struct ActivityLog;

impl ActivityLog {
    /// Run until the channel closes. Returns the number of events logged.
    pub async fn run(mut receiver: broadcast::Receiver<ActivityEvent>) -> u64 {
        let mut logged = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        target: "activity",
                        event_type = %event.event_type(),
                        entity_id = event.entity_id,
                        actor_user_id = ?event.actor_user_id,
                        payload = %event.payload,
                        "Activity"
                    );
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Activity log lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, activity log shutting down");
                    break;
                }
            }
        }
        logged
    }
}
