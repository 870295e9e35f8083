//! Worker pool — worker tasks grouped by capacity class.
//!
//! Each class holds a list of running worker tasks. Scaling a class up
//! spawns workers; scaling it down aborts the most recently started ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use fleet_core::CapacityClass;

use crate::error::{WorkerError, WorkerResult};
use crate::worker::{WorkerContext, run_worker};

struct WorkerHandle {
    id: String,
    task: JoinHandle<()>,
}

pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    /// Class name → running workers, oldest first.
    classes: Mutex<HashMap<String, Vec<WorkerHandle>>>,
    next_id: AtomicU64,
}

impl WorkerPool {
    /// Create an empty pool with one slot per capacity class.
    pub fn new(ctx: WorkerContext, classes: &[CapacityClass]) -> Self {
        Self {
            ctx: Arc::new(ctx),
            classes: Mutex::new(
                classes
                    .iter()
                    .map(|c| (c.name.clone(), Vec::new()))
                    .collect(),
            ),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub async fn has_class(&self, class: &str) -> bool {
        self.classes.lock().await.contains_key(class)
    }

    /// Spawn or abort workers until `class` runs `target` of them.
    pub async fn scale_class(&self, class: &str, target: u32) -> WorkerResult<u32> {
        let mut classes = self.classes.lock().await;
        let workers = classes
            .get_mut(class)
            .ok_or_else(|| WorkerError::UnknownClass(class.to_string()))?;

        // Workers exit on their own once the queue closes.
        workers.retain(|w| !w.task.is_finished());

        let current = workers.len() as u32;
        let target_len = target as usize;
        if target_len > workers.len() {
            while workers.len() < target_len {
                let id = format!("{class}-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                let task = tokio::spawn(run_worker(id.clone(), class.to_string(), self.ctx.clone()));
                debug!(worker_id = %id, %class, "worker spawned");
                workers.push(WorkerHandle { id, task });
            }
            info!(%class, from = current, to = target, "workers added");
        } else if target_len < workers.len() {
            for worker in workers.drain(target_len..) {
                worker.task.abort();
                debug!(worker_id = %worker.id, %class, "worker stopped");
            }
            info!(%class, from = current, to = target, "workers removed");
        }

        Ok(workers.len() as u32)
    }

    /// Workers currently running for `class`.
    pub async fn class_size(&self, class: &str) -> u32 {
        self.classes
            .lock()
            .await
            .get(class)
            .map_or(0, |workers| workers.iter().filter(|w| !w.task.is_finished()).count() as u32)
    }

    /// Workers running across every class.
    pub async fn total(&self) -> u32 {
        self.classes
            .lock()
            .await
            .values()
            .flatten()
            .filter(|w| !w.task.is_finished())
            .count() as u32
    }

    /// Abort every worker.
    pub async fn shutdown(&self) {
        let mut classes = self.classes.lock().await;
        let mut stopped = 0;
        for workers in classes.values_mut() {
            for worker in workers.drain(..) {
                worker.task.abort();
                stopped += 1;
            }
        }
        info!(stopped, "worker pool shut down");
    }
}
