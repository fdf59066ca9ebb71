//! Typed, range-bounded control parameters with one-shot modulation.
//!
//! A [`Param`] holds a base value set from the outside (UI edits, patch
//! loads) plus transient modulation state written by other units during a
//! sample: an additive offset, a multiplicative scale, an additive bias, and
//! a multiplicative sidechain factor. [`Param::evaluate`] folds them into a
//! cached current value:
//!
//! ```text
//! current = scale * base + sidechain * offset + bias
//! ```
//!
//! In [`ModMode::OneShot`] the transients snap back to their neutral
//! elements after every evaluation, so modulation decays unless re-applied
//! each sample. [`ModMode::Frozen`] persists them, letting a parameter hold
//! a sustained external modulation.
//!
//! # Example
//!
//! ```rust
//! use klang_core::Param;
//!
//! let mut cutoff = Param::continuous("cutoff", 20.0, 20_000.0, 1_000.0);
//! cutoff.set(440.0);
//! cutoff.modulate(100.0); // one-shot offset from an LFO unit
//! assert_eq!(cutoff.evaluate(), 540.0);
//! assert_eq!(cutoff.evaluate(), 440.0); // offset was consumed
//! ```

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

/// The declared kind of a parameter value.
///
/// Bool, Int, and Enum parameters quantize to whole numbers on
/// [`set`](Param::set); Continuous parameters keep the full value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Two-state toggle, stored as 0.0 or 1.0.
    Bool,
    /// Integer value within `[min, max]`.
    Int,
    /// Index into a fixed set of labeled options.
    Enum,
    /// Real value within `[min, max]`.
    Continuous,
}

/// Controls whether modulation transients survive evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModMode {
    /// Transients reset to neutral after each [`Param::evaluate`];
    /// modulation is one-shot per sample.
    #[default]
    OneShot,
    /// Transients persist across evaluations until overwritten.
    Frozen,
}

/// A named control value with a declared kind, range, and modulation state.
#[derive(Clone, Debug)]
pub struct Param {
    name: String,
    kind: ParamKind,
    min: f64,
    max: f64,
    default: f64,
    base: f64,
    cached: f64,
    mode: ModMode,
    /// Option labels for `Enum` parameters; empty otherwise.
    labels: Vec<String>,
    // Transient modulation state, written between evaluations.
    offset: f64,
    scale: f64,
    bias: f64,
    sidechain: f64,
}

impl Param {
    /// Create a boolean parameter.
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        let default = if default { 1.0 } else { 0.0 };
        Self::with_kind(name, ParamKind::Bool, 0.0, 1.0, default)
    }

    /// Create an integer parameter over `[min, max]`.
    pub fn integer(name: impl Into<String>, min: i64, max: i64, default: i64) -> Self {
        Self::with_kind(name, ParamKind::Int, min as f64, max as f64, default as f64)
    }

    /// Create an enumerated parameter from its option labels.
    ///
    /// The range is `[0, labels.len() - 1]`, defaulting to the first option.
    /// An empty label set yields a degenerate single-option parameter.
    pub fn enumerated(name: impl Into<String>, labels: &[&str]) -> Self {
        let max = labels.len().saturating_sub(1) as f64;
        let mut param = Self::with_kind(name, ParamKind::Enum, 0.0, max, 0.0);
        param.labels = labels.iter().map(|l| String::from(*l)).collect();
        param
    }

    /// Create a continuous parameter over `[min, max]`.
    pub fn continuous(name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self::with_kind(name, ParamKind::Continuous, min, max, default)
    }

    fn with_kind(name: impl Into<String>, kind: ParamKind, min: f64, max: f64, default: f64) -> Self {
        let default = default.clamp(min, max);
        Self {
            name: name.into(),
            kind,
            min,
            max,
            default,
            base: default,
            cached: default,
            mode: ModMode::OneShot,
            labels: Vec::new(),
            offset: 0.0,
            scale: 1.0,
            bias: 0.0,
            sidechain: 1.0,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Lower range bound.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper range bound.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Default value.
    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Option labels (empty unless the kind is `Enum`).
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Modulation persistence mode.
    pub fn mode(&self) -> ModMode {
        self.mode
    }

    /// Set the modulation persistence mode.
    pub fn set_mode(&mut self, mode: ModMode) {
        self.mode = mode;
    }

    /// Set the base value, clamping to `[min, max]` and quantizing
    /// non-continuous kinds. Out-of-range values clamp rather than fail.
    pub fn set(&mut self, value: f64) {
        let clamped = value.clamp(self.min, self.max);
        self.base = match self.kind {
            ParamKind::Continuous => clamped,
            ParamKind::Bool | ParamKind::Int | ParamKind::Enum => libm::round(clamped),
        };
        self.cached = self.base;
    }

    /// Set from a normalized position in `[0, 1]`, affine-mapped onto the range.
    pub fn set_normalized(&mut self, norm: f64) {
        let norm = norm.clamp(0.0, 1.0);
        self.set(self.min + norm * (self.max - self.min));
    }

    /// Current base value (as last set, before modulation).
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Most recently evaluated value.
    pub fn value(&self) -> f64 {
        self.cached
    }

    /// Base value as a normalized position in `[0, 1]`.
    pub fn normalized(&self) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        (self.base - self.min) / (self.max - self.min)
    }

    /// Base value interpreted as a boolean (`> 0.5`).
    pub fn as_bool(&self) -> bool {
        self.base > 0.5
    }

    /// Base value rounded to the nearest integer.
    pub fn as_int(&self) -> i64 {
        libm::round(self.base) as i64
    }

    /// Add into the transient additive offset.
    pub fn modulate(&mut self, value: f64) {
        self.offset += value;
    }

    /// Compose into the transient multiplicative scale.
    pub fn scale_by(&mut self, value: f64) {
        self.scale *= value;
    }

    /// Add into the transient additive bias.
    pub fn add_bias(&mut self, value: f64) {
        self.bias += value;
    }

    /// Compose into the transient multiplicative sidechain factor.
    pub fn sidechain(&mut self, value: f64) {
        self.sidechain *= value;
    }

    /// Fold base and transients into the cached current value.
    ///
    /// In [`ModMode::OneShot`] the transients reset to their neutral
    /// elements (offset 0, scale 1, bias 0, sidechain 1) immediately after,
    /// so a modulation source must write every sample to sustain its effect.
    pub fn evaluate(&mut self) -> f64 {
        self.cached = self.scale * self.base + self.sidechain * self.offset + self.bias;
        if self.mode == ModMode::OneShot {
            self.offset = 0.0;
            self.scale = 1.0;
            self.bias = 0.0;
            self.sidechain = 1.0;
        }
        self.cached
    }

    /// Restore the default value and clear all transients.
    pub fn reset(&mut self) {
        self.base = self.default;
        self.cached = self.default;
        self.offset = 0.0;
        self.scale = 1.0;
        self.bias = 0.0;
        self.sidechain = 1.0;
    }
}

/// An ordered, name-addressable set of parameters owned by one unit.
///
/// Indices are stable for the lifetime of the owning unit; invalid indices
/// and unknown names return `None` rather than panicking.
#[derive(Clone, Debug, Default)]
pub struct ParamSet {
    params: Vec<Param>,
}

impl ParamSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Append a parameter, returning its stable index.
    pub fn add(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True if the set holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter by index.
    pub fn get(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }

    /// Mutable parameter by index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Param> {
        self.params.get_mut(index)
    }

    /// Index of the parameter with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name() == name)
    }

    /// Parameter by name.
    pub fn by_name(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// Mutable parameter by name.
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.name() == name)
    }

    /// Iterate over the parameters in declaration order.
    pub fn iter(&self) -> core::slice::Iter<'_, Param> {
        self.params.iter()
    }

    /// Evaluate every parameter once (start-of-sample sweep).
    pub fn evaluate_all(&mut self) {
        for p in &mut self.params {
            p.evaluate();
        }
    }

    /// Reset every parameter to its default.
    pub fn reset_all(&mut self) {
        for p in &mut self.params {
            p.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_to_range() {
        let mut p = Param::continuous("gain", 0.0, 1.0, 0.5);
        p.set(2.5);
        assert_eq!(p.base(), 1.0);
        p.set(-1.0);
        assert_eq!(p.base(), 0.0);
    }

    #[test]
    fn int_kind_quantizes() {
        let mut p = Param::integer("steps", 0, 16, 4);
        p.set(7.6);
        assert_eq!(p.as_int(), 8);
        assert_eq!(p.base(), 8.0);
    }

    #[test]
    fn bool_round_trip() {
        let mut p = Param::boolean("legato", false);
        assert!(!p.as_bool());
        p.set(1.0);
        assert!(p.as_bool());
        p.set(0.3);
        assert!(!p.as_bool());
    }

    #[test]
    fn enum_range_follows_labels() {
        let mut p = Param::enumerated("shape", &["sine", "saw", "square"]);
        assert_eq!(p.max(), 2.0);
        p.set(5.0);
        assert_eq!(p.as_int(), 2);
        assert_eq!(p.labels().len(), 3);
    }

    #[test]
    fn normalized_affine_map() {
        let mut p = Param::continuous("freq", 100.0, 200.0, 100.0);
        p.set_normalized(0.5);
        assert_eq!(p.base(), 150.0);
        assert_eq!(p.normalized(), 0.5);
    }

    #[test]
    fn evaluate_combines_transients() {
        let mut p = Param::continuous("x", -100.0, 100.0, 0.0);
        p.set(10.0);
        p.modulate(4.0);
        p.scale_by(2.0);
        p.add_bias(1.0);
        p.sidechain(0.5);
        // scale*base + sidechain*offset + bias
        assert_eq!(p.evaluate(), 2.0 * 10.0 + 0.5 * 4.0 + 1.0);
    }

    #[test]
    fn one_shot_resets_after_evaluate() {
        let mut p = Param::continuous("x", -100.0, 100.0, 0.0);
        p.set(10.0);
        p.modulate(5.0);
        assert_eq!(p.evaluate(), 15.0);
        assert_eq!(p.evaluate(), 10.0);
    }

    #[test]
    fn frozen_persists_across_evaluations() {
        let mut p = Param::continuous("x", -100.0, 100.0, 0.0);
        p.set_mode(ModMode::Frozen);
        p.set(10.0);
        p.modulate(5.0);
        assert_eq!(p.evaluate(), 15.0);
        assert_eq!(p.evaluate(), 15.0);
    }

    #[test]
    fn reset_restores_default_and_clears_transients() {
        let mut p = Param::continuous("x", 0.0, 10.0, 3.0);
        p.set(7.0);
        p.modulate(1.0);
        p.reset();
        assert_eq!(p.base(), 3.0);
        assert_eq!(p.evaluate(), 3.0);
    }

    #[test]
    fn param_set_name_lookup() {
        let mut set = ParamSet::new();
        let a = set.add(Param::continuous("a", 0.0, 1.0, 0.0));
        let b = set.add(Param::boolean("b", true));
        assert_eq!(set.index_of("a"), Some(a));
        assert_eq!(set.index_of("b"), Some(b));
        assert_eq!(set.index_of("missing"), None);
        assert!(set.get(99).is_none());
    }
}
