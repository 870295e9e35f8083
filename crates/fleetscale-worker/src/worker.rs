//! A single worker: drains the work queue one notification at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use fleetscale_queue::{ObjectNotification, WorkQueue};

use crate::error::{WorkerError, WorkerResult};
use crate::job::RenditionJob;

/// State shared by every worker of a pool.
pub struct WorkerContext {
    pub queue: WorkQueue,
    pub output_bucket: String,
    /// Simulated time spent producing one notification's renditions.
    pub processing_time: Duration,
    processed: AtomicU64,
    renditions: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the work done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCounters {
    pub processed: u64,
    pub renditions: u64,
    /// Malformed messages acknowledged without processing.
    pub dropped: u64,
}

impl WorkerContext {
    pub fn new(queue: WorkQueue, output_bucket: impl Into<String>, processing_time: Duration) -> Self {
        Self {
            queue,
            output_bucket: output_bucket.into(),
            processing_time,
            processed: AtomicU64::new(0),
            renditions: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn counters(&self) -> WorkerCounters {
        WorkerCounters {
            processed: self.processed.load(Ordering::Relaxed),
            renditions: self.renditions.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Turn a message body into the jobs it asks for.
    pub fn plan(&self, body: &str) -> WorkerResult<Vec<RenditionJob>> {
        let notification = ObjectNotification::from_json(body)?;
        if notification.records.is_empty() {
            return Err(WorkerError::NoRecords);
        }
        notification
            .records
            .iter()
            .map(|record| {
                RenditionJob::from_key(
                    &record.s3.bucket.name,
                    &record.s3.object.key,
                    &self.output_bucket,
                )
            })
            .collect()
    }
}

/// Receive and process until the queue is closed and drained.
///
/// Cancelling the future while a job is in progress returns the message
/// to the queue.
pub async fn run_worker(worker_id: String, class: String, ctx: Arc<WorkerContext>) {
    debug!(%worker_id, %class, "worker started");

    while let Some(delivery) = ctx.queue.receive().await {
        let jobs = match ctx.plan(delivery.body()) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(
                    %worker_id,
                    message_id = delivery.message().id,
                    error = %e,
                    "dropping malformed message"
                );
                ctx.dropped.fetch_add(1, Ordering::Relaxed);
                delivery.ack();
                continue;
            }
        };

        tokio::time::sleep(ctx.processing_time).await;

        let mut produced = 0u64;
        for job in &jobs {
            produced += job.renditions.len() as u64;
            info!(
                %worker_id,
                %class,
                source = %job.source_key,
                output_bucket = %job.output_bucket,
                outputs = ?job.output_keys().collect::<Vec<_>>(),
                "renditions written"
            );
        }
        ctx.renditions.fetch_add(produced, Ordering::Relaxed);
        ctx.processed.fetch_add(1, Ordering::Relaxed);
        delivery.ack();
    }

    debug!(%worker_id, %class, "queue closed, worker exiting");
}
