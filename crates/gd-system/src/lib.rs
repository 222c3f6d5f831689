//! gd-system: hierarchical composition of grid-dynamics components.
//!
//! A [`System`] owns buses; a [`Bus`] owns loads, [`Generator`]s and a relay-only
//! [`RelayContainer`]; a generator owns a machine plus `exciter`, `governor` and `source`
//! slots. The tree is flattened into a fixed-order [`ComponentHost`](gd_solver::ComponentHost)
//! so the solver can assign offsets and evaluate it.
//!
//! # Example
//!
//! ```
//! use gd_components::factory::create_model;
//! use gd_solver::{ComponentHost, OffsetRegistry};
//! use gd_system::{Bus, Generator, Slot, System};
//!
//! let mut generator = Generator::new("g1");
//! generator.p = 0.8;
//! generator.attach(Slot::Exciter, create_model("ieee1", "avr").unwrap()).unwrap();
//!
//! let mut bus = Bus::new("b1");
//! bus.add_generator(generator);
//!
//! let mut system = System::new("demo");
//! system.add_bus(bus).unwrap();
//! system.initialize(0.0).unwrap();
//!
//! let mut offsets = OffsetRegistry::new();
//! offsets.assign(&mut system).unwrap();
//! assert_eq!(system.len(), 2);
//! ```

pub mod bus;
pub mod error;
pub mod generator;
pub mod system;

pub use bus::{Bus, BusField, Disturbance, RelayContainer};
pub use error::{SystemError, SystemResult};
pub use generator::{Generator, Slot};
pub use system::System;
