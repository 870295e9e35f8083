//! Ingestion trigger.
//!
//! `IngestionTrigger` stands in for the bucket's event wiring: object
//! events that pass its filter become notification messages on the work
//! queue. Everything else is counted and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::error::QueueResult;
use crate::notification::{OBJECT_CREATED_PUT, ObjectNotification, event_matches};
use crate::queue::WorkQueue;

pub struct IngestionTrigger {
    bucket: String,
    filter: String,
    queue: WorkQueue,
    enqueued: AtomicU64,
    ignored: AtomicU64,
}

impl IngestionTrigger {
    /// Trigger on new objects written with PUT.
    pub fn new(bucket: impl Into<String>, queue: WorkQueue) -> Self {
        let bucket = bucket.into();
        info!(%bucket, queue = %queue.name(), filter = OBJECT_CREATED_PUT, "ingestion trigger bound");
        Self {
            bucket,
            filter: OBJECT_CREATED_PUT.to_string(),
            queue,
            enqueued: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Replace the event filter (e.g. `ObjectCreated:*`).
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Handle an object event; returns whether it was enqueued.
    pub fn on_event(&self, event_name: &str, key: &str) -> QueueResult<bool> {
        if !event_matches(&self.filter, event_name) {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(event = event_name, %key, "event filtered out");
            return Ok(false);
        }

        let body = ObjectNotification::single(event_name, &self.bucket, key, Some(epoch_secs()))
            .to_json()?;
        let id = self.queue.send(body)?;
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(bucket = %self.bucket, %key, message_id = id, "object enqueued");
        Ok(true)
    }

    /// A new object was uploaded.
    pub fn object_created(&self, key: &str) -> QueueResult<bool> {
        self.on_event(OBJECT_CREATED_PUT, key)
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
