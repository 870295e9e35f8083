//! In-process compute platform backed by a [`WorkerPool`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use fleetscale_manager::{CapacityOutcome, ComputePlatform, PlatformError, PlatformFuture};

use crate::error::WorkerError;
use crate::pool::WorkerPool;

/// Runs capacity as local worker tasks.
///
/// A class can be capped at a number of units to stand in for a provider
/// running out of capacity, and the whole platform can be made
/// unreachable.
pub struct LocalPlatform {
    pool: Arc<WorkerPool>,
    limits: Mutex<HashMap<String, u32>>,
    reachable: AtomicBool,
}

impl LocalPlatform {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            limits: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn with_limit(self, class: &str, units: u32) -> Self {
        self.set_limit(class, units);
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Cap `class` at `units`.
    pub fn set_limit(&self, class: &str, units: u32) {
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.to_string(), units);
    }

    pub fn clear_limit(&self, class: &str) {
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(class);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    fn limit(&self, class: &str) -> Option<u32> {
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
            .copied()
    }
}

impl ComputePlatform for LocalPlatform {
    fn set_class_capacity<'a>(&'a self, class: &'a str, units: u32) -> PlatformFuture<'a> {
        Box::pin(async move {
            if !self.reachable.load(Ordering::Relaxed) {
                return Err(PlatformError::Unreachable("local platform disabled".to_string()));
            }

            let limit = self.limit(class);
            if limit == Some(0) && units > 0 {
                if !self.pool.has_class(class).await {
                    return Err(PlatformError::UnknownClass(class.to_string()));
                }
                warn!(%class, requested = units, "no capacity available for class");
                return Ok(CapacityOutcome::Failed);
            }

            let granted = limit.map_or(units, |l| units.min(l));
            let running = self
                .pool
                .scale_class(class, granted)
                .await
                .map_err(|e| match e {
                    WorkerError::UnknownClass(name) => PlatformError::UnknownClass(name),
                    other => PlatformError::Unreachable(other.to_string()),
                })?;

            if running < units {
                debug!(%class, requested = units, achieved = running, "class capped");
                Ok(CapacityOutcome::Partial { achieved: running })
            } else {
                Ok(CapacityOutcome::Applied)
            }
        })
    }
}
