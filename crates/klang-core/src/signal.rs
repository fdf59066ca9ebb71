//! Named scalar interconnect channels with write-combination policies.
//!
//! A [`SignalBus`] is an ordered collection of [`Channel`]s exposed by a
//! unit as its inputs or outputs. Each channel carries a default value and a
//! [`CombineMode`] applied when a connection writes into it; multiple
//! writers within one sample apply in write order. [`SignalBus::clear`]
//! restores every channel to its default and is called once per unit per
//! sample before inputs are pulled.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

/// Policy applied when a value is written into a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CombineMode {
    /// Overwrite the current value.
    #[default]
    Replace,
    /// Accumulate additively onto the current value.
    Add,
    /// Accumulate multiplicatively onto the current value.
    Multiply,
}

/// One named scalar slot on a bus.
#[derive(Clone, Debug)]
pub struct Channel {
    name: String,
    default: f64,
    value: f64,
    mode: CombineMode,
}

impl Channel {
    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value restored by [`SignalBus::clear`].
    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Write-combination policy.
    pub fn mode(&self) -> CombineMode {
        self.mode
    }
}

/// An ordered set of channels with stable indices.
#[derive(Clone, Debug, Default)]
pub struct SignalBus {
    channels: Vec<Channel>,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Add a channel, returning its stable index.
    pub fn add_channel(&mut self, name: impl Into<String>, default: f64, mode: CombineMode) -> usize {
        self.channels.push(Channel {
            name: name.into(),
            default,
            value: default,
            mode,
        });
        self.channels.len() - 1
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if the bus has no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel metadata by index.
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Index of the channel with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Combine `value` into the channel per its policy.
    ///
    /// Returns `false` (and writes nothing) for an out-of-range index.
    pub fn write(&mut self, index: usize, value: f64) -> bool {
        let Some(ch) = self.channels.get_mut(index) else {
            return false;
        };
        ch.value = match ch.mode {
            CombineMode::Replace => value,
            CombineMode::Add => ch.value + value,
            CombineMode::Multiply => ch.value * value,
        };
        true
    }

    /// Current combined value, or the default if nothing wrote since the
    /// last [`clear`](Self::clear). `None` for an out-of-range index.
    pub fn read(&self, index: usize) -> Option<f64> {
        self.channels.get(index).map(|c| c.value)
    }

    /// Change a channel's default value (takes effect at the next clear).
    ///
    /// Returns `false` for an out-of-range index.
    pub fn set_default(&mut self, index: usize, default: f64) -> bool {
        let Some(ch) = self.channels.get_mut(index) else {
            return false;
        };
        ch.default = default;
        true
    }

    /// Reset every channel to its default value.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.value = ch.default;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_default_before_any_write() {
        let mut bus = SignalBus::new();
        let ch = bus.add_channel("in", 0.25, CombineMode::Replace);
        assert_eq!(bus.read(ch), Some(0.25));
    }

    #[test]
    fn replace_overwrites() {
        let mut bus = SignalBus::new();
        let ch = bus.add_channel("in", 0.0, CombineMode::Replace);
        bus.write(ch, 1.0);
        bus.write(ch, 2.0);
        assert_eq!(bus.read(ch), Some(2.0));
    }

    #[test]
    fn add_accumulates_from_default() {
        let mut bus = SignalBus::new();
        let ch = bus.add_channel("sum", 1.0, CombineMode::Add);
        bus.write(ch, 2.0);
        bus.write(ch, 3.0);
        assert_eq!(bus.read(ch), Some(6.0));
    }

    #[test]
    fn multiply_accumulates_from_default() {
        let mut bus = SignalBus::new();
        let ch = bus.add_channel("vca", 1.0, CombineMode::Multiply);
        bus.write(ch, 0.5);
        bus.write(ch, 0.5);
        assert_eq!(bus.read(ch), Some(0.25));
    }

    #[test]
    fn clear_restores_defaults() {
        let mut bus = SignalBus::new();
        let a = bus.add_channel("a", 0.0, CombineMode::Replace);
        let b = bus.add_channel("b", -1.0, CombineMode::Add);
        bus.write(a, 5.0);
        bus.write(b, 5.0);
        bus.clear();
        assert_eq!(bus.read(a), Some(0.0));
        assert_eq!(bus.read(b), Some(-1.0));
    }

    #[test]
    fn out_of_range_access_fails_gracefully() {
        let mut bus = SignalBus::new();
        assert!(!bus.write(3, 1.0));
        assert_eq!(bus.read(3), None);
        assert!(!bus.set_default(3, 1.0));
    }

    #[test]
    fn name_lookup() {
        let mut bus = SignalBus::new();
        bus.add_channel("left", 0.0, CombineMode::Replace);
        bus.add_channel("right", 0.0, CombineMode::Replace);
        assert_eq!(bus.index_of("right"), Some(1));
        assert_eq!(bus.index_of("center"), None);
    }
}
