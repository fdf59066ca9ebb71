//! Error types for patch operations.

use thiserror::Error;

/// Errors from validating, realizing, or (de)serializing a patch.
///
/// Validation runs to completion against the patch document alone; no live
/// circuit is touched before it passes.
#[derive(Debug, Error)]
pub enum PatchError {
    /// A unit references a class the registry does not know.
    #[error("unknown unit class: {0}")]
    UnknownClass(String),

    /// Two unit records carry the same id.
    #[error("duplicate unit id: {0}")]
    DuplicateUnitId(u32),

    /// A unit record claims an id reserved for a boundary pseudo-unit.
    #[error("unit id {0} is reserved for a circuit boundary")]
    ReservedUnitId(u32),

    /// A unit record names a parameter its class does not declare.
    #[error("unknown parameter '{param}' for class '{class}'")]
    UnknownParam {
        /// The unit's class name.
        class: String,
        /// The unrecognized parameter name.
        param: String,
    },

    /// A connection references a unit id not present in the patch.
    #[error("connection references missing unit id: {0}")]
    DanglingUnit(u32),

    /// A connection references a channel its unit does not have.
    #[error("connection references invalid channel {channel} on unit {unit}")]
    InvalidChannel {
        /// The referenced unit id.
        unit: u32,
        /// The out-of-range channel index.
        channel: usize,
    },

    /// The connection set contains a cycle.
    #[error("connection set contains a cycle")]
    Cycle,

    /// JSON (de)serialization failure.
    #[error("patch JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
