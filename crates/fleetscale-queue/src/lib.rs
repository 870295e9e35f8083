//! fleetscale-queue — the work queue and what feeds it.
//!
//! # Architecture
//!
//! ```text
//! object upload
//!   │
//!   ▼
//! IngestionTrigger (bucket + event filter)
//!   │  ObjectNotification as JSON
//!   ▼
//! WorkQueue ── visible depth ──► backlog metric
//!   │
//!   ▼ receive() → Delivery (in flight)
//! worker ── ack() deletes / drop requeues
//! ```
//!
//! Only visible messages count toward the backlog; messages held by a
//! worker are in flight until acknowledged.

pub mod error;
pub mod notification;
pub mod queue;
pub mod trigger;

pub use error::{QueueError, QueueResult};
pub use notification::{OBJECT_CREATED_PUT, ObjectNotification, ObjectRecord};
pub use queue::{Delivery, Message, QueueStats, WorkQueue};
pub use trigger::IngestionTrigger;
