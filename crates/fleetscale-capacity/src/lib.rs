//! fleetscale-capacity — splitting a fleet size across capacity classes.
//!
//! ```text
//! target = 10, classes = [guaranteed {base 4, weight 1}, spot {base 0, weight 4}]
//!
//! bases      guaranteed 4, spot 0            remaining 6
//! weights    guaranteed 6*1/5 = 1, spot 6*4/5 = 4   leftover 1 → spot (highest weight)
//! result     guaranteed 5, spot 5            total 10
//! ```
//!
//! Classes are processed in declaration (priority) order. When the target
//! cannot even cover the bases, the bases shrink proportionally.

pub mod allocator;

pub use allocator::{allocate, fallback_order};
