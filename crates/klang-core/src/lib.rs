//! Klang Core - composable signal-processing graphs
//!
//! This crate provides the dataflow model for building audio processors out
//! of small, reusable nodes ("units") connected into directed acyclic
//! circuits, evaluated one sample at a time with zero allocation in the
//! audio path.
//!
//! # Core Abstractions
//!
//! ## Units
//!
//! - [`UnitKernel`] - Object-safe trait a node implements: declare channels
//!   and parameters via [`UnitSpec`], process one sample in `transform`
//! - [`Unit`] - Host wrapper owning the kernel, its [`ParamSet`], and its
//!   input/output [`SignalBus`]es, plus note/gate/tempo context
//! - [`class_id`] - Stable FNV-1a identifier for a kernel class name
//!
//! ## Parameters
//!
//! - [`Param`] - Typed ([`ParamKind`]) value with clamping, quantization,
//!   normalized access, and per-sample modulation transients
//! - [`ParamSet`] - Ordered, name-addressable parameter collection
//!
//! ## Circuits
//!
//! - [`Circuit`] - Arena of units plus a connection table, evaluated
//!   demand-driven with per-sample memoization; itself a [`UnitKernel`], so
//!   circuits nest
//! - [`Port`] - A `(unit, channel)` address used by [`Connection`]s
//!
//! ## Utility kernels
//!
//! - [`Through`], [`Gain`], [`Offset`], [`Const`], [`Mix`] - minimal
//!   building blocks and reference kernel implementations
//! - [`GateEnvelope`] - note-gated envelope that keeps its unit active
//!   through the release tail (drives voice reclamation upstream)
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (with `alloc`). Disable the default
//! `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! klang-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use klang_core::{Circuit, Gain, Port, Unit};
//!
//! let mut circuit = Circuit::new();
//! let input = circuit.add_boundary_input("in", 0.0);
//! let output = circuit.add_boundary_output("out");
//! let gain = circuit.add_unit(Unit::of(Gain::new(0.5)));
//! circuit.connect_input(input, Port::new(gain, 0)).unwrap();
//! circuit.connect_output(Port::new(gain, 0), output).unwrap();
//!
//! circuit.set_external_input(0, 1.0);
//! circuit.tick();
//! assert_eq!(circuit.read_output(0), 0.5);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocations in the per-sample path
//! - **No dependencies on std**: pure `no_std` with `libm` for math
//! - **Acyclic by construction**: `connect` rejects cycles; feedback lives
//!   inside a kernel's private state
//! - **Delegated liveness**: hosts never guess when a sound has ended; the
//!   units report it

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod circuit;
pub mod param;
pub mod signal;
pub mod unit;
pub mod units;

// Re-export main types at crate root
pub use circuit::{Circuit, CircuitError, Connection};
pub use param::{ModMode, Param, ParamKind, ParamSet};
pub use signal::{Channel, CombineMode, SignalBus};
pub use unit::{ClassId, Port, Unit, UnitId, UnitKernel, UnitSpec, class_id};
pub use units::{Const, Gain, GateEnvelope, Mix, Offset, Through};
