//! Compute platform interface.
//!
//! The fleet manager only ever asks the platform to *set* a class to a
//! unit count, never to add or remove relative amounts, so repeating a
//! request is harmless.

use std::future::Future;
use std::pin::Pin;

use crate::error::PlatformError;

/// What the platform managed to do with a set-capacity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityOutcome {
    /// The class now runs exactly the requested units.
    Applied,
    /// The class runs `achieved` units, fewer than requested.
    Partial { achieved: u32 },
    /// Nothing changed for this class.
    Failed,
}

pub type PlatformFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CapacityOutcome, PlatformError>> + Send + 'a>>;

/// A provider of capacity classes, injected so the loop runs without
/// live infrastructure.
pub trait ComputePlatform: Send + Sync {
    /// Set `class` to run `units` instances.
    fn set_class_capacity<'a>(&'a self, class: &'a str, units: u32) -> PlatformFuture<'a>;
}
