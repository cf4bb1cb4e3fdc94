//! Activity events for the authoring backend.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ActivityEvent`]: an entity-level action (`workflow.saved`,
//!   `node_definition.versioned`, ...).
//! - [`ActivityLog`]: background subscriber writing every event to the
//!   structured log.

pub mod activity_log;
pub mod bus;

pub use activity_log::ActivityLog;
pub use bus::{ActivityEvent, EventBus};
