//! Global assembly for grid-dynamics components.
//!
//! Assigns every component its offsets into the global state, root and Jacobian buffers, runs
//! the per-component evaluation passes over a [`ComponentHost`], and resolves discrete root
//! events. A fixed-step [`driver`] ties the pieces together for reference runs.

pub mod accumulator;
pub mod assembly;
pub mod driver;
pub mod error;
pub mod host;
pub mod jacobian;
pub mod offsets;
pub mod roots;

pub use accumulator::TripletAccumulator;
pub use driver::{DriverOptions, EventRecord, Trajectory, run};
pub use error::{SolverError, SolverResult};
pub use host::{ComponentHost, is_active};
pub use offsets::{ModeTotals, OffsetRegistry};
pub use roots::{DEFAULT_MAX_ITERATIONS, RootEngine, RootOutcome};
