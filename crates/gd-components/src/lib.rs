//! gd-components: dynamic power-system component models.
//!
//! Every model implements [`DaeComponent`], a uniform contract over which a solver can
//! assemble one global differential-algebraic system:
//! - sizes are fixed by `initialize_a`, a consistent start by `initialize_b`
//! - residuals, derivatives and Jacobian triplets are written at registry-assigned offsets
//! - discrete regime changes are detected through root functions and applied by `root_check`
//!
//! # Example
//!
//! ```no_run
//! use gd_components::{DaeComponent, InitFlags, IoData, factory::create_model};
//!
//! let mut exciter = create_model("ieee1", "avr1").unwrap();
//! exciter.set("ka", 400.0, gd_core::Unit::Default).unwrap();
//! exciter.initialize_a(0.0, InitFlags::empty()).unwrap();
//!
//! let mut out = IoData::new();
//! exciter
//!     .initialize_b(
//!         &IoData::from_pairs(&[("v", 1.0)]),
//!         &IoData::from_pairs(&[("ef", 2.0)]),
//!         &mut out,
//!     )
//!     .unwrap();
//! println!("vset = {:?}", out.get_named("vset"));
//! ```

pub mod common;
pub mod cosim;
pub mod error;
pub mod exciter;
pub mod factory;
pub mod flags;
pub mod governor;
pub mod io;
pub mod jacobian;
pub mod limiter;
pub mod load;
pub mod machine;
pub mod mode;
pub mod offsets;
pub mod params;
pub mod relay;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-exports
pub use cosim::{CoSimModel, DiscardPolicy, ExternalUnit, LibraryCache, UnitLibrary, UnitStatus};
pub use error::{ComponentError, ComponentResult};
pub use exciter::{ExciterIeeeType1, ExciterIeeeType2, ExciterParams};
pub use flags::{InitFlags, LimitSide, OpFlags};
pub use governor::GovernorBasic;
pub use io::{IoData, IoLocs};
pub use jacobian::{CountingSink, JacobianSink};
pub use limiter::{Limiter, ROOT_HYSTERESIS};
pub use load::Load;
pub use machine::Machine;
pub use mode::{ChangeCode, CheckLevel, SolverMode};
pub use offsets::{ComponentSizes, OffsetBlock, OffsetTable};
pub use params::{ParamField, ParamValue, get_param, set_param};
pub use relay::{Relay, RelayCondition};
pub use scheduler::{ScheduleMessage, Scheduler, TargetPoint};
pub use state::{LocalState, StateData, StateView};
pub use traits::{CloneTarget, Cloned, ComponentCore, ComponentKind, DaeComponent};
