//! Klang Patch - persistence for klang circuits
//!
//! Captures a live [`Circuit`](klang_core::Circuit) into a serializable
//! [`Patch`] document and rebuilds circuits from documents through a
//! [`UnitRegistry`](klang_registry::UnitRegistry). Documents carry
//! structure only: boundary channels, units at stable ids with parameter
//! base values, and connections. Transient state is never persisted.
//!
//! [`validate`] checks a document fully before any circuit is built, so a
//! bad patch can be rejected on the control thread and never reach the
//! audio thread (pair with the engine's prototype-swap command for live
//! loading).
//!
//! # Example
//!
//! ```rust
//! use klang_core::{Circuit, Port, Unit, Gain};
//! use klang_patch::{Patch, realize, validate};
//! use klang_registry::UnitRegistry;
//!
//! let mut circuit = Circuit::new();
//! circuit.add_boundary_input("in", 0.0);
//! circuit.add_boundary_output("out");
//! let gain = circuit.add_unit(Unit::of(Gain::new(0.5)));
//! circuit.connect_input(0, Port::new(gain, 0)).unwrap();
//! circuit.connect_output(Port::new(gain, 0), 0).unwrap();
//!
//! let registry = UnitRegistry::with_builtins();
//! let patch = Patch::capture(&circuit);
//! let json = patch.to_json().unwrap();
//!
//! let reloaded = Patch::from_json(&json).unwrap();
//! validate(&reloaded, &registry).unwrap();
//! let rebuilt = realize(&reloaded, &registry).unwrap();
//! assert_eq!(rebuilt.num_units(), 1);
//! ```

pub mod error;
pub mod realize;
pub mod schema;

pub use error::PatchError;
pub use realize::{realize, validate};
pub use schema::{ChannelRecord, ConnectionRecord, Patch, UnitRecord};
