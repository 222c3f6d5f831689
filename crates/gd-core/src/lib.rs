//! gd-core: stable foundation for gridflow.
//!
//! Contains:
//! - units (unit catalogue, per-unit bases and conversion on top of uom)
//! - numeric (Real + tolerances + float helpers)
//! - ids (stable compact IDs for tree objects)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::{PuBase, Quantity, Unit, convert};
