//! Small concrete kernels.
//!
//! These are the reference implementations of the [`UnitKernel`] contract:
//! enough to wire up useful circuits and exercise the scheduler, without
//! committing the crate to any particular synthesis style.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::param::{Param, ParamSet};
use crate::signal::{CombineMode, SignalBus};
use crate::unit::{UnitKernel, UnitSpec};

/// 1-in/1-out pass-through.
#[derive(Clone, Debug, Default)]
pub struct Through;

impl UnitKernel for Through {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.through")
            .input("in", 0.0, CombineMode::Replace)
            .output("out")
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, _params: &mut ParamSet) {
        if let Some(v) = inputs.read(0) {
            outputs.write(0, v);
        }
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// Multiplies the input by a `gain` parameter.
#[derive(Clone, Debug)]
pub struct Gain {
    default: f64,
}

impl Gain {
    /// A gain stage whose `gain` parameter defaults to `default`.
    pub fn new(default: f64) -> Self {
        Self { default }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl UnitKernel for Gain {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.gain")
            .input("in", 0.0, CombineMode::Replace)
            .output("out")
            .param(Param::continuous("gain", 0.0, 16.0, self.default))
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, params: &mut ParamSet) {
        let gain = params.get(0).map_or(1.0, Param::value);
        let v = inputs.read(0).unwrap_or(0.0);
        outputs.write(0, v * gain);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// Adds an `offset` parameter to the input. With nothing connected it acts
/// as a constant source.
#[derive(Clone, Debug)]
pub struct Offset {
    default: f64,
}

impl Offset {
    /// An offset stage whose `offset` parameter defaults to `default`.
    pub fn new(default: f64) -> Self {
        Self { default }
    }
}

impl Default for Offset {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl UnitKernel for Offset {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.offset")
            .input("in", 0.0, CombineMode::Replace)
            .output("out")
            .param(Param::continuous("offset", -1.0e6, 1.0e6, self.default))
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, params: &mut ParamSet) {
        let offset = params.get(0).map_or(0.0, Param::value);
        let v = inputs.read(0).unwrap_or(0.0);
        outputs.write(0, v + offset);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// Emits a `value` parameter, ignoring any input.
#[derive(Clone, Debug)]
pub struct Const {
    default: f64,
}

impl Const {
    /// A constant source whose `value` parameter defaults to `default`.
    pub fn new(default: f64) -> Self {
        Self { default }
    }
}

impl Default for Const {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl UnitKernel for Const {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.const")
            .output("out")
            .param(Param::continuous("value", -1.0e6, 1.0e6, self.default))
    }

    fn transform(&mut self, _inputs: &SignalBus, outputs: &mut SignalBus, params: &mut ParamSet) {
        outputs.write(0, params.get(0).map_or(0.0, Param::value));
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

/// Additive two-input mixer. Both inputs combine into `out` as a sum; the
/// input channels themselves also accept multiple writers each.
#[derive(Clone, Debug, Default)]
pub struct Mix;

impl UnitKernel for Mix {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.mix")
            .input("a", 0.0, CombineMode::Add)
            .input("b", 0.0, CombineMode::Add)
            .output("out")
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, _params: &mut ParamSet) {
        let a = inputs.read(0).unwrap_or(0.0);
        let b = inputs.read(1).unwrap_or(0.0);
        outputs.write(0, a + b);
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EnvelopeStage {
    Idle,
    Attack,
    Sustain,
    Release,
}

/// Note-gated amplitude envelope with linear attack and exponential release.
///
/// Scales the input by the envelope level. Reports itself active for the
/// whole release tail, so a voice circuit containing one keeps sounding
/// after note-off until the level has fully decayed. This is the canonical
/// way a circuit communicates "still audible" to its host.
#[derive(Clone, Debug)]
pub struct GateEnvelope {
    stage: EnvelopeStage,
    level: f64,
    sample_rate: f64,
}

/// Below this level a releasing envelope is considered silent.
const RELEASE_FLOOR: f64 = 1.0e-4;

impl GateEnvelope {
    /// Current envelope level in `[0, 1]`.
    pub fn level(&self) -> f64 {
        self.level
    }
}

impl Default for GateEnvelope {
    fn default() -> Self {
        Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            sample_rate: 48_000.0,
        }
    }
}

impl UnitKernel for GateEnvelope {
    fn spec(&self) -> UnitSpec {
        UnitSpec::new("util.gate_envelope")
            .input("in", 1.0, CombineMode::Replace)
            .output("out")
            .param(Param::continuous("attack", 1.0e-4, 10.0, 5.0e-3))
            .param(Param::continuous("release", 1.0e-4, 10.0, 0.1))
    }

    fn transform(&mut self, inputs: &SignalBus, outputs: &mut SignalBus, params: &mut ParamSet) {
        // Rates re-derive every sample so parameter modulation of the times
        // takes hold immediately.
        let sample_rate = self.sample_rate;
        match self.stage {
            EnvelopeStage::Idle => {}
            EnvelopeStage::Attack => {
                let attack = params.get(0).map_or(5.0e-3, Param::value);
                self.level += 1.0 / (attack * sample_rate);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release => {
                let release = params.get(1).map_or(0.1, Param::value);
                self.level *= libm::exp(-1.0 / (release * sample_rate));
                if self.level < RELEASE_FLOOR {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        let v = inputs.read(0).unwrap_or(0.0);
        outputs.write(0, v * self.level);
    }

    fn on_note_on(&mut self, _note: u8, _velocity: u8) {
        // Retrigger resumes from the current level, so restarts click-free.
        self.stage = EnvelopeStage::Attack;
    }

    fn on_note_off(&mut self, _note: u8, _velocity: u8) {
        self.stage = EnvelopeStage::Release;
    }

    fn on_sample_rate_change(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    fn is_active(&self, gate: bool) -> bool {
        gate || self.stage != EnvelopeStage::Idle
    }

    fn clone_kernel(&self) -> Box<dyn UnitKernel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;

    fn tick_once(unit: &mut Unit, input: f64) -> f64 {
        unit.inputs_mut().clear();
        unit.inputs_mut().write(0, input);
        unit.run_transform(0);
        unit.outputs().read(0).unwrap_or(0.0)
    }

    #[test]
    fn gain_scales_input() {
        let mut u = Unit::of(Gain::new(2.0));
        assert_eq!(tick_once(&mut u, 3.0), 6.0);
        u.set_param(0, 0.5);
        assert_eq!(tick_once(&mut u, 3.0), 1.5);
    }

    #[test]
    fn offset_acts_as_source_when_unconnected() {
        let mut u = Unit::of(Offset::new(4.0));
        u.run_transform(0);
        assert_eq!(u.outputs().read(0), Some(4.0));
    }

    #[test]
    fn const_ignores_input_and_emits_value() {
        let mut u = Unit::of(Const::new(0.25));
        u.run_transform(0);
        assert_eq!(u.outputs().read(0), Some(0.25));
    }

    #[test]
    fn mix_sums_both_inputs() {
        let mut u = Unit::of(Mix);
        u.inputs_mut().write(0, 1.5);
        u.inputs_mut().write(1, 2.5);
        u.run_transform(0);
        assert_eq!(u.outputs().read(0), Some(4.0));
    }

    #[test]
    fn envelope_reports_active_through_release_tail() {
        let mut u = Unit::of(GateEnvelope::default());
        assert!(!u.is_active());
        u.note_on(60, 100);
        assert!(u.is_active());
        for _ in 0..100 {
            tick_once(&mut u, 1.0);
        }
        u.note_off(60, 0);
        // Gate is down but the release tail keeps the unit active.
        assert!(u.is_active());
        let mut remaining = 200_000u32;
        while u.is_active() && remaining > 0 {
            tick_once(&mut u, 1.0);
            remaining -= 1;
        }
        assert!(!u.is_active());
        assert_eq!(tick_once(&mut u, 1.0), 0.0);
    }

    #[test]
    fn envelope_attack_is_linear_to_full_level() {
        let mut u = Unit::of(GateEnvelope::default());
        u.note_on(60, 100);
        let mut last = 0.0;
        for _ in 0..10 {
            let v = tick_once(&mut u, 1.0);
            assert!(v >= last);
            last = v;
        }
    }
}
