//! fleetscale-worker — the fleet the control loop scales.
//!
//! # Architecture
//!
//! ```text
//! LocalPlatform ── set_class_capacity(class, n) ──► WorkerPool
//!   (limits, reachability)                            │ scale_class
//!                                                     ▼
//!                                      worker tasks per capacity class
//!                                                     │ receive
//!                                                     ▼
//!                                   WorkQueue ── notification ──► RenditionJob
//! ```
//!
//! Each worker is one unit of capacity. Removing a worker aborts its task;
//! a message it was holding goes back to the queue.

pub mod error;
pub mod job;
pub mod platform;
pub mod pool;
pub mod worker;

pub use error::{WorkerError, WorkerResult};
pub use job::{Rendition, RenditionJob};
pub use platform::LocalPlatform;
pub use pool::WorkerPool;
pub use worker::{WorkerContext, WorkerCounters};
