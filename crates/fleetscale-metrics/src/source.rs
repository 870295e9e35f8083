//! Backlog metric sources.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fleet_core::{BacklogSample, Timestamp};
use fleetscale_queue::WorkQueue;
use thiserror::Error;
use tracing::{debug, info};

pub type MetricResult<T> = Result<T, MetricError>;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("unknown metric source: {0}")]
    UnknownSource(String),

    #[error("metric unavailable for {source_id}: {reason}")]
    Unavailable { source_id: String, reason: String },
}

/// Boxed future returned by [`BacklogSource::read_backlog`].
pub type SampleFuture<'a> = Pin<Box<dyn Future<Output = MetricResult<BacklogSample>> + Send + 'a>>;

/// Something that can report the backlog depth of a named source.
///
/// Implementations must return samples with non-decreasing timestamps
/// whose value is the maximum over the window since the previous read.
pub trait BacklogSource: Send + Sync {
    fn read_backlog<'a>(&'a self, source_id: &'a str) -> SampleFuture<'a>;
}

/// Backlog of in-process work queues, keyed by queue name.
pub struct QueueBacklogSource {
    queues: HashMap<String, WorkQueue>,
    /// Last timestamp handed out, so samples never go backwards.
    last_timestamp: AtomicU64,
}

impl QueueBacklogSource {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            last_timestamp: AtomicU64::new(0),
        }
    }

    /// Track `queue` under its own name.
    pub fn with_queue(mut self, queue: WorkQueue) -> Self {
        self.register(queue);
        self
    }

    pub fn register(&mut self, queue: WorkQueue) {
        let name = queue.name().to_string();
        info!(source = %name, "backlog source registered");
        self.queues.insert(name, queue);
    }

    pub fn sources(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    fn sample(&self, source_id: &str) -> MetricResult<BacklogSample> {
        let queue = self
            .queues
            .get(source_id)
            .ok_or_else(|| MetricError::UnknownSource(source_id.to_string()))?;

        if queue.is_closed() && queue.visible() == 0 {
            return Err(MetricError::Unavailable {
                source_id: source_id.to_string(),
                reason: "queue closed".to_string(),
            });
        }

        let depth = queue.take_window_max();
        let timestamp = self.next_timestamp(epoch_secs());
        debug!(source = %source_id, depth, timestamp, "backlog sampled");
        Ok(BacklogSample::new(depth as f64, timestamp))
    }

    fn next_timestamp(&self, now: Timestamp) -> Timestamp {
        let prev = self.last_timestamp.fetch_max(now, Ordering::Relaxed);
        prev.max(now)
    }
}

impl Default for QueueBacklogSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BacklogSource for QueueBacklogSource {
    fn read_backlog<'a>(&'a self, source_id: &'a str) -> SampleFuture<'a> {
        Box::pin(async move { self.sample(source_id) })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_max_over_window() {
        let queue = WorkQueue::new("jobs");
        let source = QueueBacklogSource::new().with_queue(queue.clone());

        for i in 0..8 {
            queue.send(format!("m{i}")).unwrap();
        }
        for _ in 0..6 {
            queue.try_receive().unwrap().ack();
        }

        let sample = source.read_backlog("jobs").await.unwrap();
        assert_eq!(sample.value, 8.0);

        let sample = source.read_backlog("jobs").await.unwrap();
        assert_eq!(sample.value, 2.0);
    }

    #[tokio::test]
    async fn unknown_source_is_an_error() {
        let source = QueueBacklogSource::new();
        let err = source.read_backlog("missing").await.unwrap_err();
        assert!(matches!(err, MetricError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn drained_closed_queue_is_unavailable() {
        let queue = WorkQueue::new("jobs");
        let source = QueueBacklogSource::new().with_queue(queue.clone());
        queue.close();
        let err = source.read_backlog("jobs").await.unwrap_err();
        assert!(matches!(err, MetricError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn timestamps_never_decrease() {
        let queue = WorkQueue::new("jobs");
        let source = QueueBacklogSource::new().with_queue(queue);
        let mut prev = 0;
        for _ in 0..5 {
            let sample = source.read_backlog("jobs").await.unwrap();
            assert!(sample.timestamp >= prev);
            prev = sample.timestamp;
        }
    }

    #[test]
    fn clock_skew_does_not_rewind() {
        let source = QueueBacklogSource::new();
        assert_eq!(source.next_timestamp(100), 100);
        assert_eq!(source.next_timestamp(90), 100);
        assert_eq!(source.next_timestamp(110), 110);
    }

    #[test]
    fn lists_registered_sources() {
        let mut source = QueueBacklogSource::new();
        source.register(WorkQueue::new("a"));
        source.register(WorkQueue::new("b"));
        let mut names = source.sources();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
