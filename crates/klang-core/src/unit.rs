//! The unit kernel contract and the node wrapper around it.
//!
//! A [`UnitKernel`] is the customization point supplied by a concrete
//! processing node: it declares its channels and parameters up front via
//! [`UnitSpec`] and implements a per-sample `transform`. The engine-facing
//! [`Unit`] wraps a boxed kernel together with its parameter set, input and
//! output buses, note-gate state, and the per-sample memoization flag used
//! by the circuit scheduler.
//!
//! Kernels are identified by a stable [`ClassId`] hashed from the class
//! name, never from a pointer or registration order, so a persisted graph
//! resolves against any build that registers the same class names.
//!
//! # Implementing a kernel
//!
//! ```rust
//! use klang_core::{CombineMode, ParamSet, SignalBus, UnitKernel, UnitSpec};
//!
//! #[derive(Clone, Default)]
//! struct Inverter;
//!
//! impl UnitKernel for Inverter {
//!     fn spec(&self) -> UnitSpec {
//!         UnitSpec::new("util.invert")
//!             .input("in", 0.0, CombineMode::Replace)
//!             .output("out")
//!     }
//!
//!     fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, _params: &mut ParamSet) {
//!         let x = inputs.read(0).unwrap_or(0.0);
//!         outputs.write(0, -x);
//!     }
//!
//!     fn clone_kernel(&self) -> Box<dyn UnitKernel> {
//!         Box::new(self.clone())
//!     }
//! }
//! ```

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

use crate::param::{Param, ParamSet};
use crate::signal::{CombineMode, SignalBus};

/// Stable identifier for a kernel class, derived from its class name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Raw hash value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Hash a class name into its [`ClassId`] (32-bit FNV-1a).
///
/// Deterministic across builds and platforms, unlike `std` hashing.
pub const fn class_id(name: &str) -> ClassId {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0x811c9dc5;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(0x01000193);
        i += 1;
    }
    ClassId(hash)
}

/// Identifier of a unit within its owning circuit's arena.
///
/// Stable for the unit's lifetime; freed ids may be reused by later
/// insertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) u32);

impl UnitId {
    /// Raw arena index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Construct from a raw arena index.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }
}

/// One endpoint of a connection: a unit plus a channel index on one of its
/// buses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Port {
    /// The unit owning the channel.
    pub unit: UnitId,
    /// Channel index on that unit's bus (outputs for a source port, inputs
    /// for a sink port).
    pub channel: usize,
}

impl Port {
    /// Construct a port.
    pub fn new(unit: UnitId, channel: usize) -> Self {
        Self { unit, channel }
    }
}

/// Declaration of one channel in a [`UnitSpec`].
#[derive(Clone, Debug)]
pub struct ChannelSpec {
    /// Channel name.
    pub name: String,
    /// Default value restored each sample before inputs are pulled.
    pub default: f64,
    /// Write-combination policy for multiple writers.
    pub mode: CombineMode,
}

/// Everything a kernel declares at construction: class name, channels, and
/// parameters.
#[derive(Debug, Default)]
pub struct UnitSpec {
    /// Stable class name, e.g. `"util.gain"`.
    pub class: &'static str,
    /// Input channel declarations.
    pub inputs: Vec<ChannelSpec>,
    /// Output channel declarations.
    pub outputs: Vec<ChannelSpec>,
    /// Parameter declarations.
    pub params: Vec<Param>,
}

impl UnitSpec {
    /// Start a spec for the given class name.
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Declare an input channel.
    pub fn input(mut self, name: impl Into<String>, default: f64, mode: CombineMode) -> Self {
        self.inputs.push(ChannelSpec {
            name: name.into(),
            default,
            mode,
        });
        self
    }

    /// Declare an output channel (defaults to 0.0, Replace).
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(ChannelSpec {
            name: name.into(),
            default: 0.0,
            mode: CombineMode::Replace,
        });
        self
    }

    /// Declare a parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

/// The plugin contract implemented by concrete processing nodes.
///
/// Object-safe and `Send` so kernels can cross from the control thread into
/// the audio thread inside commands and circuit clones. All hooks have
/// no-op defaults; only [`spec`](Self::spec), [`transform`](Self::transform)
/// and [`clone_kernel`](Self::clone_kernel) are mandatory.
pub trait UnitKernel: Send {
    /// Declare class name, channels, and parameters. Called once when the
    /// wrapping [`Unit`] is built; must be pure.
    fn spec(&self) -> UnitSpec;

    /// Produce this sample's outputs from the pulled inputs.
    ///
    /// Runs exactly once per sample per unit (memoized by the owning
    /// circuit). Parameters have been evaluated for this sample; read them
    /// with [`Param::value`](crate::Param::value). Must not allocate,
    /// block, or panic.
    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, params: &mut ParamSet);

    /// Note-on notification forwarded from the owning circuit.
    fn on_note_on(&mut self, _note: u8, _velocity: u8) {}

    /// Note-off notification forwarded from the owning circuit.
    fn on_note_off(&mut self, _note: u8, _velocity: u8) {}

    /// Sample rate change notification.
    fn on_sample_rate_change(&mut self, _sample_rate: f64) {}

    /// Tempo change notification.
    fn on_tempo_change(&mut self, _tempo: f64) {}

    /// Clear per-voice transient state (delay lines, envelope stages).
    /// Declared channels and parameters are preserved by the wrapper.
    fn reset(&mut self) {}

    /// Whether this kernel is still producing audible output.
    ///
    /// `gate` is the wrapper's note-gate state (true between note-on and
    /// note-off); the default follows it. Envelope-bearing kernels override
    /// this to report activity until their release tail finishes; voice
    /// reclamation is driven entirely by these reports.
    fn is_active(&self, gate: bool) -> bool {
        gate
    }

    /// Deep-copy this kernel, including private state, for voice cloning.
    fn clone_kernel(&self) -> Box<dyn UnitKernel>;
}

/// A processing node: a kernel plus its declared parameters and buses.
///
/// Owned exclusively by one [`Circuit`](crate::Circuit). The wrapper tracks
/// note-gate state, audio configuration, and the sample index of its last
/// transform. Memoization keys on that index rather than a cleared-and-set
/// flag, so a missed clear can never pass off a stale output as current.
pub struct Unit {
    kernel: Box<dyn UnitKernel>,
    class: &'static str,
    params: ParamSet,
    inputs: SignalBus,
    outputs: SignalBus,
    note: u8,
    velocity: u8,
    gate: bool,
    sample_rate: f64,
    tempo: f64,
    ticked_at: Option<u64>,
}

impl Unit {
    /// Build a unit from a boxed kernel by applying its [`UnitSpec`].
    pub fn new(kernel: Box<dyn UnitKernel>) -> Self {
        let spec = kernel.spec();
        let mut params = ParamSet::new();
        for p in spec.params {
            params.add(p);
        }
        let mut inputs = SignalBus::new();
        for ch in spec.inputs {
            inputs.add_channel(ch.name, ch.default, ch.mode);
        }
        let mut outputs = SignalBus::new();
        for ch in spec.outputs {
            outputs.add_channel(ch.name, ch.default, ch.mode);
        }
        Self {
            kernel,
            class: spec.class,
            params,
            inputs,
            outputs,
            note: 0,
            velocity: 0,
            gate: false,
            sample_rate: 48_000.0,
            tempo: 120.0,
            ticked_at: None,
        }
    }

    /// Build a unit from an unboxed kernel.
    pub fn of(kernel: impl UnitKernel + 'static) -> Self {
        Self::new(Box::new(kernel))
    }

    /// Stable class name declared by the kernel.
    pub fn class(&self) -> &'static str {
        self.class
    }

    /// Stable class identifier (FNV-1a of the class name).
    pub fn class_id(&self) -> ClassId {
        class_id(self.class)
    }

    /// Parameter set.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Mutable parameter set.
    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Input bus.
    pub fn inputs(&self) -> &SignalBus {
        &self.inputs
    }

    /// Output bus.
    pub fn outputs(&self) -> &SignalBus {
        &self.outputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut SignalBus {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut SignalBus {
        &mut self.outputs
    }

    /// Set a parameter's base value by index; `false` if the index is
    /// invalid. Out-of-range values clamp.
    pub fn set_param(&mut self, index: usize, value: f64) -> bool {
        match self.params.get_mut(index) {
            Some(p) => {
                p.set(value);
                true
            }
            None => false,
        }
    }

    /// Set a parameter from a normalized `[0, 1]` position by index.
    pub fn set_param_normalized(&mut self, index: usize, norm: f64) -> bool {
        match self.params.get_mut(index) {
            Some(p) => {
                p.set_normalized(norm);
                true
            }
            None => false,
        }
    }

    /// Bound note number (valid while the gate is or was set).
    pub fn note(&self) -> u8 {
        self.note
    }

    /// Bound velocity.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Note-gate state: true between note-on and note-off.
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Bind a note and notify the kernel.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.note = note;
        self.velocity = velocity;
        self.gate = true;
        self.kernel.on_note_on(note, velocity);
    }

    /// Release the gate and notify the kernel.
    pub fn note_off(&mut self, note: u8, velocity: u8) {
        self.gate = false;
        self.kernel.on_note_off(note, velocity);
    }

    /// Update the sample rate and notify the kernel.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.kernel.on_sample_rate_change(sample_rate);
    }

    /// Update the tempo and notify the kernel.
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.kernel.on_tempo_change(tempo);
    }

    /// Whether this unit is still producing audible output.
    pub fn is_active(&self) -> bool {
        self.kernel.is_active(self.gate)
    }

    /// Clear per-voice transient state: gate, buses, memo key, and the
    /// kernel's private state. Parameter base values are preserved.
    pub fn reset(&mut self) {
        self.gate = false;
        self.inputs.clear();
        self.outputs.clear();
        self.ticked_at = None;
        self.kernel.reset();
    }

    /// True if the unit already produced output for `sample`.
    pub(crate) fn has_ticked(&self, sample: u64) -> bool {
        self.ticked_at == Some(sample)
    }

    /// Evaluate parameters and run the kernel transform, recording `sample`
    /// as the memo key. The caller (the circuit scheduler) has already
    /// pulled inputs.
    pub(crate) fn run_transform(&mut self, sample: u64) {
        self.params.evaluate_all();
        self.outputs.clear();
        self.kernel
            .transform(&self.inputs, &mut self.outputs, &mut self.params);
        self.ticked_at = Some(sample);
    }
}

impl Clone for Unit {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone_kernel(),
            class: self.class,
            params: self.params.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            note: self.note,
            velocity: self.velocity,
            gate: self.gate,
            sample_rate: self.sample_rate,
            tempo: self.tempo,
            ticked_at: self.ticked_at,
        }
    }
}

impl core::fmt::Debug for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Unit")
            .field("class", &self.class)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("params", &self.params.len())
            .field("gate", &self.gate)
            .finish()
    }
}
