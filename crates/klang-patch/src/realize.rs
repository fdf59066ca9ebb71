//! Patch validation and realization.
//!
//! Everything that can be wrong with a patch document is reported by
//! [`validate`] against the document and registry alone, before any circuit
//! is constructed. [`realize`] validates and then rebuilds the circuit with
//! recorded ids, parameter values, and connections.

use std::collections::{HashMap, HashSet};

use klang_core::{Circuit, CircuitError, Port, Unit, UnitId};
use klang_registry::UnitRegistry;

use crate::error::PatchError;
use crate::schema::Patch;

/// Per-class channel counts, instantiated once per distinct class.
struct ClassShape {
    inputs: usize,
    outputs: usize,
}

fn class_shapes<'a>(
    patch: &'a Patch,
    registry: &UnitRegistry,
) -> Result<HashMap<&'a str, ClassShape>, PatchError> {
    let mut shapes: HashMap<&str, ClassShape> = HashMap::new();
    for record in &patch.units {
        if shapes.contains_key(record.class.as_str()) {
            continue;
        }
        let unit = registry
            .create_named(&record.class)
            .ok_or_else(|| PatchError::UnknownClass(record.class.clone()))?;
        shapes.insert(
            record.class.as_str(),
            ClassShape {
                inputs: unit.inputs().len(),
                outputs: unit.outputs().len(),
            },
        );
    }
    Ok(shapes)
}

/// Check a patch against a registry without touching any live circuit.
///
/// Reports unknown classes, reserved or duplicate unit ids, unknown
/// parameter names, dangling or out-of-range connection endpoints, and
/// cycles in the connection set.
pub fn validate(patch: &Patch, registry: &UnitRegistry) -> Result<(), PatchError> {
    let shapes = class_shapes(patch, registry)?;

    let mut seen = HashSet::new();
    for record in &patch.units {
        if record.id == patch.boundary_input || record.id == patch.boundary_output {
            return Err(PatchError::ReservedUnitId(record.id));
        }
        if !seen.insert(record.id) {
            return Err(PatchError::DuplicateUnitId(record.id));
        }
        // Parameter names must exist on the class.
        let prototype = registry
            .create_named(&record.class)
            .ok_or_else(|| PatchError::UnknownClass(record.class.clone()))?;
        for name in record.params.keys() {
            if prototype.params().by_name(name).is_none() {
                return Err(PatchError::UnknownParam {
                    class: record.class.clone(),
                    param: name.clone(),
                });
            }
        }
    }

    // Channel counts per recorded id, boundaries included.
    let mut ports: HashMap<u32, (usize, usize)> = HashMap::new();
    ports.insert(patch.boundary_input, (0, patch.inputs.len()));
    ports.insert(patch.boundary_output, (patch.outputs.len(), patch.outputs.len()));
    for record in &patch.units {
        let shape = &shapes[record.class.as_str()];
        ports.insert(record.id, (shape.inputs, shape.outputs));
    }

    for c in &patch.connections {
        let (_, from_outputs) = ports
            .get(&c.from_unit)
            .ok_or(PatchError::DanglingUnit(c.from_unit))?;
        if c.from_port >= *from_outputs {
            return Err(PatchError::InvalidChannel {
                unit: c.from_unit,
                channel: c.from_port,
            });
        }
        let (to_inputs, _) = ports
            .get(&c.to_unit)
            .ok_or(PatchError::DanglingUnit(c.to_unit))?;
        if c.to_port >= *to_inputs {
            return Err(PatchError::InvalidChannel {
                unit: c.to_unit,
                channel: c.to_port,
            });
        }
    }

    check_acyclic(patch)?;
    Ok(())
}

/// Depth-first cycle check over the recorded connection set.
fn check_acyclic(patch: &Patch) -> Result<(), PatchError> {
    let mut adjacency: HashMap<u32, Vec<u32>> = HashMap::new();
    for c in &patch.connections {
        if c.from_unit == c.to_unit {
            return Err(PatchError::Cycle);
        }
        adjacency.entry(c.from_unit).or_default().push(c.to_unit);
    }

    // 0 = unvisited, 1 = on the current path, 2 = done.
    let mut color: HashMap<u32, u8> = HashMap::new();
    for &start in adjacency.keys() {
        if color.get(&start).copied().unwrap_or(0) != 0 {
            continue;
        }
        // (node, next child index) pairs emulate the recursion.
        let mut stack = vec![(start, 0usize)];
        color.insert(start, 1);
        while let Some(&mut (node, ref mut child)) = stack.last_mut() {
            let next = adjacency.get(&node).and_then(|a| a.get(*child)).copied();
            *child += 1;
            match next {
                Some(n) => match color.get(&n).copied().unwrap_or(0) {
                    0 => {
                        color.insert(n, 1);
                        stack.push((n, 0));
                    }
                    1 => return Err(PatchError::Cycle),
                    _ => {}
                },
                None => {
                    color.insert(node, 2);
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

fn convert(err: CircuitError) -> PatchError {
    match err {
        CircuitError::CycleDetected => PatchError::Cycle,
        CircuitError::UnknownUnit(id) => PatchError::DanglingUnit(id.index()),
        CircuitError::InvalidPort(p) => PatchError::InvalidChannel {
            unit: p.unit.index(),
            channel: p.channel,
        },
        CircuitError::BoundaryUnit(id) | CircuitError::OccupiedId(id) => {
            PatchError::DuplicateUnitId(id.index())
        }
        CircuitError::DuplicateConnection => PatchError::Cycle,
    }
}

/// Validate and rebuild the described circuit.
///
/// Units land at their recorded arena ids with recorded parameter base
/// values; connections and boundary declarations are reproduced exactly.
pub fn realize(patch: &Patch, registry: &UnitRegistry) -> Result<Circuit, PatchError> {
    validate(patch, registry)?;

    let mut circuit = Circuit::new();
    for record in &patch.inputs {
        circuit.add_boundary_input(&record.name, record.default);
    }
    for record in &patch.outputs {
        circuit.add_boundary_output(&record.name);
    }

    for record in &patch.units {
        let mut unit: Unit = registry
            .create_named(&record.class)
            .ok_or_else(|| PatchError::UnknownClass(record.class.clone()))?;
        for (name, value) in &record.params {
            if let Some(p) = unit.params_mut().by_name_mut(name) {
                p.set(*value);
            }
        }
        circuit
            .add_unit_with_id(UnitId::from_index(record.id), unit)
            .map_err(convert)?;
    }

    // Recorded boundary ids may differ from the fresh circuit's; remap.
    let (input_id, output_id) = (circuit.input_id(), circuit.output_id());
    let map_id = |id: u32| -> UnitId {
        if id == patch.boundary_input {
            input_id
        } else if id == patch.boundary_output {
            output_id
        } else {
            UnitId::from_index(id)
        }
    };
    for c in &patch.connections {
        let from = Port::new(map_id(c.from_unit), c.from_port);
        let to = Port::new(map_id(c.to_unit), c.to_port);
        circuit.connect(from, to).map_err(convert)?;
    }

    Ok(circuit)
}
