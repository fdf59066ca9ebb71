//! Unit registry and factory for klang circuit kernels.
//!
//! A [`UnitRegistry`] maps stable class identifiers to prototype kernels so
//! units can be instantiated by id or name at runtime - the factory that
//! persistence and UIs build against. There is no global singleton: hosts
//! construct a registry explicitly and pass it by reference wherever units
//! are created.
//!
//! Class identifiers come from [`class_id`], a stable hash of the kernel's
//! class name, so ids survive recompilation and can be stored in patch
//! files.
//!
//! # Example
//!
//! ```rust
//! use klang_core::class_id;
//! use klang_registry::UnitRegistry;
//!
//! let registry = UnitRegistry::with_builtins();
//!
//! // List everything available, grouped for UI purposes.
//! for entry in registry.entries() {
//!     let _ = (entry.group, entry.name, entry.class);
//! }
//!
//! // Instantiate by stable id or by class name.
//! let by_id = registry.create(class_id("util.gain")).unwrap();
//! let by_name = registry.create_named("util.gain").unwrap();
//! assert_eq!(by_id.class_id(), by_name.class_id());
//! ```
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! klang-registry = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

use klang_core::{
    ClassId, Const, Gain, GateEnvelope, Mix, Offset, Through, Unit, UnitKernel, class_id,
};

/// Describes one registered unit class.
#[derive(Debug, Clone, Copy)]
pub struct UnitEntry {
    /// Organizational group (e.g. `"util"`), for UI grouping.
    pub group: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// The kernel's class name, as reported by its spec.
    pub class: &'static str,
    /// Stable identifier: `class_id(class)`.
    pub id: ClassId,
}

struct RegistryEntry {
    entry: UnitEntry,
    prototype: Box<dyn UnitKernel>,
}

/// Factory of unit classes, keyed by stable class id.
///
/// Registration stores a prototype kernel; creation deep-copies it, so a
/// prototype registered with non-default internal state produces units
/// starting from that state.
pub struct UnitRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry pre-loaded with the built-in utility kernels.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("util", "Through", Box::new(Through));
        r.register("util", "Gain", Box::new(Gain::default()));
        r.register("util", "Offset", Box::new(Offset::default()));
        r.register("util", "Const", Box::new(Const::default()));
        r.register("util", "Mix", Box::new(Mix));
        r.register("util", "Gate Envelope", Box::new(GateEnvelope::default()));
        r
    }

    /// Register a prototype kernel under `group`/`name`.
    ///
    /// The stable id is derived from the kernel's own class name. A second
    /// registration with the same class replaces the first.
    pub fn register(&mut self, group: &'static str, name: &'static str, prototype: Box<dyn UnitKernel>) -> ClassId {
        let class = prototype.spec().class;
        let id = class_id(class);
        let entry = RegistryEntry {
            entry: UnitEntry {
                group,
                name,
                class,
                id,
            },
            prototype,
        };
        match self.entries.iter_mut().find(|e| e.entry.id == id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        id
    }

    /// Instantiate a unit by stable class id.
    pub fn create(&self, id: ClassId) -> Option<Unit> {
        self.entries
            .iter()
            .find(|e| e.entry.id == id)
            .map(|e| Unit::new(e.prototype.clone_kernel()))
    }

    /// Instantiate a unit by class name.
    pub fn create_named(&self, class: &str) -> Option<Unit> {
        self.create(class_id(class))
    }

    /// Stable id for a `group`/`name` pair, if registered.
    pub fn resolve_named(&self, group: &str, name: &str) -> Option<ClassId> {
        self.entries
            .iter()
            .find(|e| e.entry.group == group && e.entry.name == name)
            .map(|e| e.entry.id)
    }

    /// Metadata for a class id, if registered.
    pub fn resolve(&self, id: ClassId) -> Option<&UnitEntry> {
        self.entries.iter().find(|e| e.entry.id == id).map(|e| &e.entry)
    }

    /// Metadata for every registered class, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &UnitEntry> {
        self.entries.iter().map(|e| &e.entry)
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl core::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_resolvable_by_id_and_name() {
        let r = UnitRegistry::with_builtins();
        assert_eq!(r.len(), 6);
        let id = class_id("util.gain");
        let entry = r.resolve(id).unwrap();
        assert_eq!(entry.class, "util.gain");
        assert_eq!(entry.group, "util");
        let unit = r.create(id).unwrap();
        assert_eq!(unit.class(), "util.gain");
        assert!(r.create_named("util.mix").is_some());
    }

    #[test]
    fn unknown_class_yields_none() {
        let r = UnitRegistry::with_builtins();
        assert!(r.create(class_id("no.such.unit")).is_none());
        assert!(r.resolve(class_id("no.such.unit")).is_none());
    }

    #[test]
    fn prototype_state_is_copied_into_new_units() {
        let mut r = UnitRegistry::new();
        r.register("util", "Loud Gain", Box::new(Gain::new(4.0)));
        let unit = r.create_named("util.gain").unwrap();
        assert_eq!(unit.params().get(0).unwrap().base(), 4.0);
    }

    #[test]
    fn re_registration_replaces_the_prototype() {
        let mut r = UnitRegistry::with_builtins();
        r.register("util", "Gain", Box::new(Gain::new(2.0)));
        assert_eq!(r.len(), 6);
        let unit = r.create_named("util.gain").unwrap();
        assert_eq!(unit.params().get(0).unwrap().base(), 2.0);
    }
}
