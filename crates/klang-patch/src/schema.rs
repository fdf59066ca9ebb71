//! The patch document: a serializable description of one circuit.
//!
//! A patch records everything needed to rebuild a circuit through a
//! [`UnitRegistry`](klang_registry::UnitRegistry): boundary channel
//! declarations, unit records at their arena ids with parameter base
//! values, and the connection table. Transient state (envelope levels,
//! modulation, note bindings) is deliberately not captured.

use std::collections::BTreeMap;

use klang_core::Circuit;
use serde::{Deserialize, Serialize};

use crate::error::PatchError;

/// One boundary channel declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel name.
    pub name: String,
    /// Resting value (meaningful for inputs; outputs rest at zero).
    #[serde(default)]
    pub default: f64,
}

/// One unit at its recorded arena id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Arena id the unit occupies, preserved across save/load so external
    /// references (automation targets, commands) stay valid.
    pub id: u32,
    /// Registered class name, e.g. `"util.gain"`.
    pub class: String,
    /// Parameter base values by name. Parameters not listed keep their
    /// declared defaults.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

/// One directed connection between recorded units (boundary ids included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Source unit id.
    pub from_unit: u32,
    /// Output channel on the source unit.
    pub from_port: usize,
    /// Sink unit id.
    pub to_unit: u32,
    /// Input channel on the sink unit.
    pub to_port: usize,
}

fn default_boundary_input() -> u32 {
    0
}

fn default_boundary_output() -> u32 {
    1
}

/// A complete circuit description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// External input channels, in channel order.
    #[serde(default)]
    pub inputs: Vec<ChannelRecord>,
    /// External output channels, in channel order.
    #[serde(default)]
    pub outputs: Vec<ChannelRecord>,
    /// Arena id connections use for the input boundary pseudo-unit.
    #[serde(default = "default_boundary_input")]
    pub boundary_input: u32,
    /// Arena id connections use for the output boundary pseudo-unit.
    #[serde(default = "default_boundary_output")]
    pub boundary_output: u32,
    /// Unit records.
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    /// Connection records.
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl Patch {
    /// Snapshot a live circuit's structure.
    pub fn capture(circuit: &Circuit) -> Self {
        let input_id = circuit.input_id();
        let output_id = circuit.output_id();

        let inputs = circuit
            .unit(input_id)
            .map(|u| {
                (0..u.outputs().len())
                    .filter_map(|i| u.outputs().channel(i))
                    .map(|ch| ChannelRecord {
                        name: ch.name().to_string(),
                        default: ch.default_value(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let outputs = circuit
            .unit(output_id)
            .map(|u| {
                (0..u.outputs().len())
                    .filter_map(|i| u.outputs().channel(i))
                    .map(|ch| ChannelRecord {
                        name: ch.name().to_string(),
                        default: 0.0,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let units = circuit
            .unit_ids()
            .filter(|&id| id != input_id && id != output_id)
            .filter_map(|id| circuit.unit(id).map(|u| (id, u)))
            .map(|(id, u)| UnitRecord {
                id: id.index(),
                class: u.class().to_string(),
                params: u
                    .params()
                    .iter()
                    .map(|p| (p.name().to_string(), p.base()))
                    .collect(),
            })
            .collect();

        let connections = circuit
            .connections()
            .iter()
            .map(|c| ConnectionRecord {
                from_unit: c.from.unit.index(),
                from_port: c.from.channel,
                to_unit: c.to.unit.index(),
                to_port: c.to.channel,
            })
            .collect();

        Self {
            inputs,
            outputs,
            boundary_input: input_id.index(),
            boundary_output: output_id.index(),
            units,
            connections,
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON. Structural validity is checked separately by
    /// [`validate`](crate::validate).
    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        Ok(serde_json::from_str(json)?)
    }
}
