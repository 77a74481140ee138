//! Persisted graph error types

use keel_core::{ConcreteTypeId, ObjectHandle};
use keel_physics::PhysicsError;
use thiserror::Error;

use crate::graph::SerialId;

/// Errors produced while collecting, encoding or reconciling a graph
#[derive(Debug, Error)]
pub enum SerialError {
    /// Two persisted objects share an id
    #[error("Duplicate persisted object id {0}")]
    DuplicateId(SerialId),

    /// A persisted id is also bound to an external object
    #[error("Persisted id {0} is also bound to an external object")]
    ExternalConflict(SerialId),

    /// The type id is not in the registry
    #[error("Object {id} has unregistered type id {type_id}")]
    UnknownType { id: SerialId, type_id: ConcreteTypeId },

    /// The payload does not describe the declared type
    #[error("Object {id} declares type {declared} but carries a {payload} payload")]
    PayloadMismatch {
        id: SerialId,
        declared: &'static str,
        payload: &'static str,
    },

    /// An edge names an id that is neither persisted nor external
    #[error("Edge {owner} -> {target} references unknown object {missing}")]
    DanglingEdge {
        owner: SerialId,
        target: SerialId,
        missing: SerialId,
    },

    /// No ownership relation joins these two types
    #[error("Edge {owner} -> {target} cannot join {owner_type} to {target_type}")]
    IllegalEdge {
        owner: SerialId,
        target: SerialId,
        owner_type: &'static str,
        target_type: &'static str,
    },

    /// The same actor lists a shape twice
    #[error("Edge {owner} -> {target} appears more than once")]
    DuplicateEdge { owner: SerialId, target: SerialId },

    /// A shape's geometry edges disagree with its geometry parameters
    #[error("Shape {shape}: {detail}")]
    GeometryEdge { shape: SerialId, detail: String },

    /// An exclusive shape is owned by more than one actor
    #[error("Exclusive shape {shape} is owned by {owners} actors")]
    SharedExclusiveShape { shape: SerialId, owners: usize },

    /// An external binding names an object that is gone or not shareable
    #[error("External object {id} ({handle}) is not a live reference-counted object")]
    InvalidExternal { id: SerialId, handle: ObjectHandle },

    /// The object to collect is not alive
    #[error("Cannot collect {0}: object is not alive")]
    NotAlive(ObjectHandle),

    /// Encoded with a format this build cannot read
    #[error("Unsupported persisted graph version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Object layer error during construction
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    /// Byte encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, SerialError>;
