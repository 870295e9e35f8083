//! fleetscale-metrics — where the backlog signal comes from.
//!
//! The fleet manager only sees the [`BacklogSource`] trait. The bundled
//! [`QueueBacklogSource`] reads the visible depth of in-process work
//! queues and reports the maximum seen over each polling window.
//!
//! ```text
//! QueueBacklogSource
//!   ├── register(WorkQueue)         ← one entry per source id
//!   └── read_backlog(source_id)     → BacklogSample { max depth, timestamp }
//! ```

pub mod source;

pub use source::{BacklogSource, MetricError, MetricResult, QueueBacklogSource, SampleFuture};
