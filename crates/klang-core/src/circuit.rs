//! The circuit: a composite unit owning a graph of child units.
//!
//! A [`Circuit`] holds an arena of [`Unit`]s indexed by [`UnitId`], a
//! connection table between their ports, and two boundary pseudo-units
//! representing the circuit's own input and output channels. Evaluation is
//! demand-driven: [`Circuit::tick`] advances a sample index and walks the
//! dependency graph depth-first from the output boundary, so each unit's
//! inputs are computed before its transform runs; memoization on the
//! sample index makes shared fan-out units run exactly once per sample.
//!
//! The connection table must stay acyclic; apparent feedback belongs inside
//! a single kernel's private state, never across units. [`Circuit::connect`]
//! rejects any edge that would close a cycle and leaves the table untouched.
//!
//! Mutations (add/remove/connect) happen at control time; `tick()` itself
//! performs no allocation, using scratch storage pre-allocated on the
//! circuit.
//!
//! A circuit is itself a [`UnitKernel`], so circuits may nest, though the
//! primary usage is one flat circuit per voice.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

use crate::param::ParamSet;
use crate::signal::{CombineMode, SignalBus};
use crate::unit::{Port, Unit, UnitId, UnitKernel, UnitSpec};

/// Errors from circuit structure edits.
///
/// Never produced inside the real-time tick path; surfaced synchronously to
/// the (control-thread) caller performing the edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitError {
    /// The referenced unit id is not present in the arena.
    UnknownUnit(UnitId),
    /// The referenced port's channel index does not exist on that unit.
    InvalidPort(Port),
    /// An identical connection already exists.
    DuplicateConnection,
    /// Adding this connection would close a cycle across units.
    CycleDetected,
    /// The operation targets a boundary pseudo-unit.
    BoundaryUnit(UnitId),
    /// The requested arena id is already occupied.
    OccupiedId(UnitId),
}

impl core::fmt::Display for CircuitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownUnit(id) => write!(f, "unit {} not found", id.index()),
            Self::InvalidPort(p) => {
                write!(f, "invalid port: unit {} channel {}", p.unit.index(), p.channel)
            }
            Self::DuplicateConnection => write!(f, "connection already exists"),
            Self::CycleDetected => write!(f, "connection would create a cycle"),
            Self::BoundaryUnit(id) => {
                write!(f, "unit {} is a boundary pseudo-unit", id.index())
            }
            Self::OccupiedId(id) => write!(f, "unit id {} is already occupied", id.index()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CircuitError {}

/// A directed connection between two ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    /// Source: an output channel on the upstream unit.
    pub from: Port,
    /// Sink: an input channel on the downstream unit.
    pub to: Port,
}

/// Boundary pseudo-unit carrying the circuit's external input channels.
///
/// Its output bus is populated by the scheduler from the circuit's external
/// input values; the transform itself does nothing.
#[derive(Clone, Default)]
struct BoundaryIn;

impl UnitKernel for BoundaryIn {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("circuit.input")
    }

    fn transform(&mut self, _inputs: &SignalBus, _outputs: &mut SignalBus, _params: &mut ParamSet) {}

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// Boundary pseudo-unit carrying the circuit's external output channels.
/// Copies each input channel to the output channel of the same index.
#[derive(Clone, Default)]
struct BoundaryOut;

impl UnitKernel for BoundaryOut {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("circuit.output")
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, _params: &mut ParamSet) {
        for i in 0..inputs.len() {
            if let Some(v) = inputs.read(i) {
                outputs.write(i, v);
            }
        }
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// A composite unit: an arena of child units plus their connection graph.
pub struct Circuit {
    units: Vec<Option<Unit>>,
    free: Vec<u32>,
    connections: Vec<Connection>,
    input_id: UnitId,
    output_id: UnitId,
    /// Sticky external input values, one per boundary input channel.
    /// Audio inputs are rewritten every sample; control values persist.
    external_in: Vec<f64>,
    sample_rate: f64,
    tempo: f64,
    /// Current sample index, the memoization key for child evaluation.
    sample: u64,
    // Pre-allocated evaluation scratch; tick() must not allocate.
    eval_stack: Vec<u32>,
    gather: Vec<(usize, f64)>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Create an empty circuit holding only its two boundary pseudo-units.
    pub fn new() -> Self {
        let units = vec![Some(Unit::of(BoundaryIn)), Some(Unit::of(BoundaryOut))];
        Self {
            units,
            free: Vec::new(),
            connections: Vec::new(),
            input_id: UnitId(0),
            output_id: UnitId(1),
            external_in: Vec::new(),
            sample_rate: 48_000.0,
            tempo: 120.0,
            sample: 0,
            eval_stack: Vec::new(),
            gather: Vec::new(),
        }
    }

    /// Id of the input boundary pseudo-unit.
    pub fn input_id(&self) -> UnitId {
        self.input_id
    }

    /// Id of the output boundary pseudo-unit.
    pub fn output_id(&self) -> UnitId {
        self.output_id
    }

    /// Declare an external input channel, returning its index.
    ///
    /// `default` is the channel's resting value, also used as the initial
    /// sticky external value.
    pub fn add_boundary_input(&mut self, name: &str, default: f64) -> usize {
        self.external_in.push(default);
        if let Some(u) = self.unit_slot_mut(self.input_id) {
            u.outputs_mut().add_channel(name, default, CombineMode::Replace)
        } else {
            self.external_in.len() - 1
        }
    }

    /// Declare an external output channel, returning its index.
    ///
    /// Multiple internal writers into one output channel sum.
    pub fn add_boundary_output(&mut self, name: &str) -> usize {
        if let Some(u) = self.unit_slot_mut(self.output_id) {
            let idx = u.inputs_mut().add_channel(name, 0.0, CombineMode::Add);
            u.outputs_mut().add_channel(name, 0.0, CombineMode::Replace);
            idx
        } else {
            0
        }
    }

    /// Number of external input channels.
    pub fn num_inputs(&self) -> usize {
        self.external_in.len()
    }

    /// Number of external output channels.
    pub fn num_outputs(&self) -> usize {
        self.unit(self.output_id).map_or(0, |u| u.outputs().len())
    }

    /// Set the sticky value fed into an external input channel.
    ///
    /// Returns `false` for an out-of-range channel. The value persists
    /// across samples until overwritten, so it serves both per-sample audio
    /// input and held control values.
    pub fn set_external_input(&mut self, channel: usize, value: f64) -> bool {
        match self.external_in.get_mut(channel) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Read an external output channel as of the last [`tick`](Self::tick).
    /// Out-of-range channels read as 0.0.
    pub fn read_output(&self, channel: usize) -> f64 {
        self.unit(self.output_id)
            .and_then(|u| u.outputs().read(channel))
            .unwrap_or(0.0)
    }

    /// Add a unit, returning its stable id. Freed ids are reused.
    pub fn add_unit(&mut self, mut unit: Unit) -> UnitId {
        unit.set_sample_rate(self.sample_rate);
        unit.set_tempo(self.tempo);
        let id = if let Some(index) = self.free.pop() {
            self.units[index as usize] = Some(unit);
            UnitId(index)
        } else {
            self.units.push(Some(unit));
            UnitId(self.units.len() as u32 - 1)
        };
        self.reserve_scratch();
        #[cfg(feature = "tracing")]
        tracing::debug!(id = id.index(), "circuit_add_unit");
        id
    }

    /// Add a unit at a specific arena id (used when realizing a persisted
    /// graph, where recorded ids must be preserved).
    pub fn add_unit_with_id(&mut self, id: UnitId, unit: Unit) -> Result<(), CircuitError> {
        if id == self.input_id || id == self.output_id {
            return Err(CircuitError::BoundaryUnit(id));
        }
        let index = id.index() as usize;
        if index >= self.units.len() {
            let first_new = self.units.len() as u32;
            self.units.resize_with(index + 1, || None);
            for hole in first_new..index as u32 {
                self.free.push(hole);
            }
        }
        if self.units[index].is_some() {
            return Err(CircuitError::OccupiedId(id));
        }
        let mut unit = unit;
        unit.set_sample_rate(self.sample_rate);
        unit.set_tempo(self.tempo);
        self.units[index] = Some(unit);
        self.free.retain(|&f| f != id.index());
        self.reserve_scratch();
        Ok(())
    }

    /// Remove a unit and every connection touching it.
    ///
    /// No-ops if the id is absent or refers to a boundary pseudo-unit.
    pub fn remove_unit(&mut self, id: UnitId) {
        if id == self.input_id || id == self.output_id {
            return;
        }
        let index = id.index() as usize;
        let Some(slot) = self.units.get_mut(index) else {
            return;
        };
        if slot.take().is_none() {
            return;
        }
        self.connections
            .retain(|c| c.from.unit != id && c.to.unit != id);
        self.free.push(id.index());
        #[cfg(feature = "tracing")]
        tracing::debug!(id = id.index(), "circuit_remove_unit");
    }

    /// Unit by id.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.index() as usize).and_then(|s| s.as_ref())
    }

    /// Mutable unit by id.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.unit_slot_mut(id)
    }

    fn unit_slot_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id.index() as usize).and_then(|s| s.as_mut())
    }

    /// Ids of all live units, boundary pseudo-units included.
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| UnitId(i as u32)))
    }

    /// Number of live units, boundary pseudo-units excluded.
    pub fn num_units(&self) -> usize {
        self.units.iter().flatten().count().saturating_sub(2)
    }

    /// The connection table.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Set a unit parameter's base value; `false` on any invalid reference.
    pub fn set_unit_param(&mut self, id: UnitId, param: usize, value: f64) -> bool {
        self.unit_slot_mut(id).is_some_and(|u| u.set_param(param, value))
    }

    /// Set a unit parameter from a normalized `[0, 1]` position.
    pub fn set_unit_param_normalized(&mut self, id: UnitId, param: usize, norm: f64) -> bool {
        self.unit_slot_mut(id)
            .is_some_and(|u| u.set_param_normalized(param, norm))
    }

    /// Connect an output port to an input port.
    ///
    /// Fails, leaving the connection table unchanged, on unknown units,
    /// out-of-range channels, duplicate edges, and any edge that would close
    /// a cycle. A cycle exists if `to`'s unit can already reach `from`'s
    /// unit through existing connections.
    pub fn connect(&mut self, from: Port, to: Port) -> Result<(), CircuitError> {
        let from_unit = self.unit(from.unit).ok_or(CircuitError::UnknownUnit(from.unit))?;
        if from.channel >= from_unit.outputs().len() {
            return Err(CircuitError::InvalidPort(from));
        }
        let to_unit = self.unit(to.unit).ok_or(CircuitError::UnknownUnit(to.unit))?;
        if to.channel >= to_unit.inputs().len() {
            return Err(CircuitError::InvalidPort(to));
        }
        if self.connections.iter().any(|c| c.from == from && c.to == to) {
            return Err(CircuitError::DuplicateConnection);
        }
        if from.unit == to.unit || self.can_reach(to.unit, from.unit) {
            return Err(CircuitError::CycleDetected);
        }
        self.connections.push(Connection { from, to });
        self.reserve_scratch();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            from_unit = from.unit.index(),
            from_channel = from.channel,
            to_unit = to.unit.index(),
            to_channel = to.channel,
            "circuit_connect"
        );
        Ok(())
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn disconnect(&mut self, from: Port, to: Port) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| !(c.from == from && c.to == to));
        self.connections.len() != before
    }

    /// Bind an external input channel to an internal unit's input port.
    pub fn connect_input(&mut self, channel: usize, to: Port) -> Result<(), CircuitError> {
        self.connect(Port::new(self.input_id, channel), to)
    }

    /// Bind an internal unit's output port to an external output channel.
    pub fn connect_output(&mut self, from: Port, channel: usize) -> Result<(), CircuitError> {
        self.connect(from, Port::new(self.output_id, channel))
    }

    /// Grow the evaluation scratch with the graph. A node is pushed at most
    /// once per incoming edge plus once as the root, and a gather pass reads
    /// at most every connection, so these bounds keep `tick` allocation-free
    /// from the first sample after any topology edit.
    fn reserve_scratch(&mut self) {
        let stack_bound = self.units.len() + self.connections.len();
        if self.eval_stack.capacity() < stack_bound {
            self.eval_stack.reserve(stack_bound - self.eval_stack.len());
        }
        if self.gather.capacity() < self.connections.len() {
            self.gather.reserve(self.connections.len() - self.gather.len());
        }
    }

    /// True if `start`'s unit can reach `goal` by following connections
    /// downstream. Control-time only; allocates traversal scratch.
    fn can_reach(&self, start: UnitId, goal: UnitId) -> bool {
        let mut visited = vec![false; self.units.len()];
        let mut stack = vec![start.index()];
        while let Some(index) = stack.pop() {
            if index == goal.index() {
                return true;
            }
            let Some(seen) = visited.get_mut(index as usize) else {
                continue;
            };
            if *seen {
                continue;
            }
            *seen = true;
            for c in &self.connections {
                if c.from.unit.index() == index {
                    stack.push(c.to.unit.index());
                }
            }
        }
        false
    }

    /// Produce one sample: advance the sample index and evaluate the
    /// dependency chain of the output boundary unit. Allocation-free.
    pub fn tick(&mut self) {
        self.sample = self.sample.wrapping_add(1);
        self.eval(self.output_id);
    }

    /// Memoized depth-first evaluation rooted at `root`.
    ///
    /// A unit is popped and transformed only once every upstream dependency
    /// is memoized for the current sample index; unevaluated dependencies
    /// are pushed first. The connection table is acyclic by construction,
    /// so the walk terminates. Memoization keys on the sample index itself,
    /// not a flag that must be cleared, so shared fan-out units run exactly
    /// once per sample and stale state cannot masquerade as fresh output.
    fn eval(&mut self, root: UnitId) {
        let sample = self.sample;
        self.eval_stack.clear();
        self.eval_stack.push(root.index());
        while let Some(&top) = self.eval_stack.last() {
            let Some(unit) = self.units.get(top as usize).and_then(|s| s.as_ref()) else {
                self.eval_stack.pop();
                continue;
            };
            if unit.has_ticked(sample) {
                self.eval_stack.pop();
                continue;
            }
            let mut pending = false;
            for c in &self.connections {
                if c.to.unit.index() != top {
                    continue;
                }
                if let Some(up) = self.units.get(c.from.unit.index() as usize).and_then(|s| s.as_ref())
                    && !up.has_ticked(sample)
                {
                    self.eval_stack.push(c.from.unit.index());
                    pending = true;
                }
            }
            if pending {
                continue;
            }
            self.eval_stack.pop();

            // Pull inputs across incoming connections, then transform.
            self.gather.clear();
            for c in &self.connections {
                if c.to.unit.index() != top {
                    continue;
                }
                if let Some(up) = self.units.get(c.from.unit.index() as usize).and_then(|s| s.as_ref())
                    && let Some(v) = up.outputs().read(c.from.channel)
                {
                    self.gather.push((c.to.channel, v));
                }
            }
            let is_boundary_in = top == self.input_id.index();
            if let Some(u) = self.units.get_mut(top as usize).and_then(|s| s.as_mut()) {
                u.inputs_mut().clear();
                for &(channel, value) in &self.gather {
                    u.inputs_mut().write(channel, value);
                }
                u.run_transform(sample);
                if is_boundary_in {
                    for (channel, &value) in self.external_in.iter().enumerate() {
                        u.outputs_mut().write(channel, value);
                    }
                }
            }
        }
    }

    /// Forward note-on to every child unit.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        for u in self.units.iter_mut().flatten() {
            u.note_on(note, velocity);
        }
    }

    /// Forward note-off to every child unit.
    pub fn note_off(&mut self, note: u8, velocity: u8) {
        for u in self.units.iter_mut().flatten() {
            u.note_off(note, velocity);
        }
    }

    /// Update the sample rate on the circuit and every child unit.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for u in self.units.iter_mut().flatten() {
            u.set_sample_rate(sample_rate);
        }
    }

    /// Update the tempo on the circuit and every child unit.
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        for u in self.units.iter_mut().flatten() {
            u.set_tempo(tempo);
        }
    }

    /// Current sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Clear per-voice transient state on every child unit. Parameter base
    /// values, connections, and sticky external inputs are preserved.
    pub fn reset(&mut self) {
        for u in self.units.iter_mut().flatten() {
            u.reset();
        }
    }

    /// True while any child unit reports activity. Inactivity detection is
    /// delegated entirely to the units (e.g. envelope release tails).
    pub fn is_active(&self) -> bool {
        self.units.iter().flatten().any(|u| u.is_active())
    }
}

// Manual so voice clones get freshly reserved scratch rather than the
// zero-capacity vectors a derived clone of empty scratch would produce.
impl Clone for Circuit {
    fn clone(&self) -> Self {
        let mut cloned = Self {
            units: self.units.clone(),
            free: self.free.clone(),
            connections: self.connections.clone(),
            input_id: self.input_id,
            output_id: self.output_id,
            external_in: self.external_in.clone(),
            sample_rate: self.sample_rate,
            tempo: self.tempo,
            sample: self.sample,
            eval_stack: Vec::new(),
            gather: Vec::new(),
        };
        cloned.reserve_scratch();
        cloned
    }
}

impl core::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Circuit")
            .field("units", &self.num_units())
            .field("connections", &self.connections.len())
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .finish()
    }
}

impl UnitKernel for Circuit {
    fn spec(&self) -> UnitSpec {
        let mut spec = UnitSpec::new("circuit");
        if let Some(input) = self.unit(self.input_id) {
            for i in 0..input.outputs().len() {
                if let Some(ch) = input.outputs().channel(i) {
                    spec = spec.input(ch.name(), ch.default_value(), CombineMode::Replace);
                }
            }
        }
        if let Some(output) = self.unit(self.output_id) {
            for i in 0..output.outputs().len() {
                if let Some(ch) = output.outputs().channel(i) {
                    spec = spec.output(ch.name());
                }
            }
        }
        spec
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, _params: &mut ParamSet) {
        for channel in 0..self.external_in.len() {
            if let Some(v) = inputs.read(channel) {
                self.set_external_input(channel, v);
            }
        }
        self.tick();
        for channel in 0..outputs.len() {
            outputs.write(channel, self.read_output(channel));
        }
    }

    fn on_note_on(&mut self, note: u8, velocity: u8) {
        self.note_on(note, velocity);
    }

    fn on_note_off(&mut self, note: u8, velocity: u8) {
        self.note_off(note, velocity);
    }

    fn on_sample_rate_change(&mut self, sample_rate: f64) {
        self.set_sample_rate(sample_rate);
    }

    fn on_tempo_change(&mut self, tempo: f64) {
        self.set_tempo(tempo);
    }

    fn reset(&mut self) {
        Circuit::reset(self);
    }

    fn is_active(&self, gate: bool) -> bool {
        gate || Circuit::is_active(self)
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Gain, Through};

    fn patch_through() -> (Circuit, UnitId) {
        let mut c = Circuit::new();
        c.add_boundary_input("in", 0.0);
        c.add_boundary_output("out");
        let t = c.add_unit(Unit::of(Through::default()));
        c.connect_input(0, Port::new(t, 0)).unwrap();
        c.connect_output(Port::new(t, 0), 0).unwrap();
        (c, t)
    }

    #[test]
    fn passthrough_ticks_external_input_to_output() {
        let (mut c, _) = patch_through();
        c.set_external_input(0, 0.75);
        c.tick();
        assert_eq!(c.read_output(0), 0.75);
    }

    #[test]
    fn chain_applies_in_dependency_order() {
        let mut c = Circuit::new();
        c.add_boundary_input("in", 0.0);
        c.add_boundary_output("out");
        let g1 = c.add_unit(Unit::of(Gain::new(2.0)));
        let g2 = c.add_unit(Unit::of(Gain::new(3.0)));
        c.connect_input(0, Port::new(g1, 0)).unwrap();
        c.connect(Port::new(g1, 0), Port::new(g2, 0)).unwrap();
        c.connect_output(Port::new(g2, 0), 0).unwrap();
        c.set_external_input(0, 1.0);
        c.tick();
        assert_eq!(c.read_output(0), 6.0);
    }

    /// Emits how many times its transform has run. Any double evaluation
    /// within a sample shows up as a skipped count downstream.
    #[derive(Clone, Default)]
    struct Counter {
        count: f64,
    }

    impl UnitKernel for Counter {
        fn spec(&self) -> UnitSpec {
            UnitSpec::new("test.counter").output("count")
        }

        fn transform(&mut self, _i: &SignalBus, outputs: &mut SignalBus, _p: &mut ParamSet) {
            self.count += 1.0;
            outputs.write(0, self.count);
        }

        fn clone_kernel(&self) -> Box<dyn UnitKernel> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn fan_out_is_memoized_per_sample() {
        let mut c = Circuit::new();
        c.add_boundary_output("out");
        let src = c.add_unit(Unit::of(Counter::default()));
        let a = c.add_unit(Unit::of(Through::default()));
        let b = c.add_unit(Unit::of(Through::default()));
        c.connect(Port::new(src, 0), Port::new(a, 0)).unwrap();
        c.connect(Port::new(src, 0), Port::new(b, 0)).unwrap();
        c.connect_output(Port::new(a, 0), 0).unwrap();
        c.connect_output(Port::new(b, 0), 0).unwrap();
        c.tick();
        // Both consumers saw the same single evaluation: 1 + 1, not 1 + 2.
        assert_eq!(c.read_output(0), 2.0);
        c.tick();
        assert_eq!(c.read_output(0), 4.0);
    }

    #[test]
    fn evaluation_scratch_is_reserved_before_the_first_tick() {
        let mut c = Circuit::new();
        c.add_boundary_output("out");
        let src = c.add_unit(Unit::of(Counter::default()));
        let a = c.add_unit(Unit::of(Through::default()));
        c.connect(Port::new(src, 0), Port::new(a, 0)).unwrap();
        c.connect_output(Port::new(a, 0), 0).unwrap();
        let stack_bound = c.units.len() + c.connections.len();
        assert!(c.eval_stack.capacity() >= stack_bound);
        assert!(c.gather.capacity() >= c.connections.len());
        // A clone must carry reserved scratch too; the voice pool is built
        // from clones and their first tick runs on the audio thread.
        let cloned = c.clone();
        assert!(cloned.eval_stack.capacity() >= stack_bound);
        assert!(cloned.gather.capacity() >= cloned.connections.len());
    }

    #[test]
    fn cycle_is_rejected_and_table_unchanged() {
        let mut c = Circuit::new();
        let a = c.add_unit(Unit::of(Through::default()));
        let b = c.add_unit(Unit::of(Through::default()));
        c.connect(Port::new(a, 0), Port::new(b, 0)).unwrap();
        let before = c.connections().len();
        let err = c.connect(Port::new(b, 0), Port::new(a, 0)).unwrap_err();
        assert_eq!(err, CircuitError::CycleDetected);
        assert_eq!(c.connections().len(), before);
        // Self-loop is also a cycle.
        assert_eq!(
            c.connect(Port::new(a, 0), Port::new(a, 0)),
            Err(CircuitError::CycleDetected)
        );
    }

    #[test]
    fn connect_validates_references() {
        let mut c = Circuit::new();
        let a = c.add_unit(Unit::of(Through::default()));
        assert_eq!(
            c.connect(Port::new(UnitId(99), 0), Port::new(a, 0)),
            Err(CircuitError::UnknownUnit(UnitId(99)))
        );
        assert_eq!(
            c.connect(Port::new(a, 5), Port::new(a, 0)),
            Err(CircuitError::InvalidPort(Port::new(a, 5)))
        );
    }

    #[test]
    fn duplicate_connection_is_rejected() {
        let mut c = Circuit::new();
        let a = c.add_unit(Unit::of(Through::default()));
        let b = c.add_unit(Unit::of(Through::default()));
        c.connect(Port::new(a, 0), Port::new(b, 0)).unwrap();
        assert_eq!(
            c.connect(Port::new(a, 0), Port::new(b, 0)),
            Err(CircuitError::DuplicateConnection)
        );
    }

    #[test]
    fn remove_unit_drops_its_connections_and_reuses_id() {
        let mut c = Circuit::new();
        let a = c.add_unit(Unit::of(Through::default()));
        let b = c.add_unit(Unit::of(Through::default()));
        c.connect(Port::new(a, 0), Port::new(b, 0)).unwrap();
        c.remove_unit(a);
        assert!(c.unit(a).is_none());
        assert!(c.connections().is_empty());
        let again = c.add_unit(Unit::of(Through::default()));
        assert_eq!(again, a);
    }

    #[test]
    fn remove_boundary_unit_is_a_no_op() {
        let mut c = Circuit::new();
        let input = c.input_id();
        c.remove_unit(input);
        assert!(c.unit(input).is_some());
    }

    #[test]
    fn clone_preserves_ids_and_is_independent() {
        let (mut proto, t) = patch_through();
        let mut voice = proto.clone();
        assert!(voice.unit(t).is_some());
        voice.set_external_input(0, 1.0);
        voice.tick();
        assert_eq!(voice.read_output(0), 1.0);
        // The prototype never ticked and keeps its own state.
        proto.tick();
        assert_eq!(proto.read_output(0), 0.0);
    }

    #[test]
    fn nested_circuit_acts_as_a_unit() {
        let (inner, _) = patch_through();
        let mut outer = Circuit::new();
        outer.add_boundary_input("in", 0.0);
        outer.add_boundary_output("out");
        let nested = outer.add_unit(Unit::of(inner));
        outer.connect_input(0, Port::new(nested, 0)).unwrap();
        outer.connect_output(Port::new(nested, 0), 0).unwrap();
        outer.set_external_input(0, 0.5);
        outer.tick();
        assert_eq!(outer.read_output(0), 0.5);
    }

    #[test]
    fn inactive_until_note_on() {
        let (mut c, _) = patch_through();
        assert!(!c.is_active());
        c.note_on(60, 100);
        assert!(c.is_active());
        c.note_off(60, 0);
        assert!(!c.is_active());
    }
}
