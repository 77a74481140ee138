//! Error types for the physics object layer

use keel_core::{ObjectHandle, Severity, TypeRegistryError};
use keel_memory::AllocError;
use thiserror::Error;

/// Physics object layer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A second foundation was requested while one is alive
    #[error("A foundation already exists; only one instance per process can be created")]
    FoundationExists,

    /// The foundation is still referenced and cannot shut down
    #[error("Foundation is still referenced by {0} owners")]
    FoundationInUse(usize),

    /// The type hierarchy failed to register
    #[error("Type registration failed: {0}")]
    TypeRegistration(#[from] TypeRegistryError),

    /// The allocation gateway failed
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// Handle refers to an object that has been destroyed
    #[error("Handle {0} refers to a destroyed object")]
    StaleHandle(ObjectHandle),

    /// Object exists but is not of the kind the operation needs
    #[error("Object {handle} is a {found}, expected {expected}")]
    WrongType {
        handle: ObjectHandle,
        expected: &'static str,
        found: &'static str,
    },

    /// No counted edge is defined between these kinds
    #[error("No ownership edge is defined from {owner} to {target}")]
    InvalidEdge {
        owner: &'static str,
        target: &'static str,
    },

    /// Shape is already attached to this actor
    #[error("Shape {shape} is already attached to actor {actor}")]
    AlreadyAttached {
        actor: ObjectHandle,
        shape: ObjectHandle,
    },

    /// Shape is not attached to this actor
    #[error("Shape {shape} is not attached to actor {actor}")]
    NotAttached {
        actor: ObjectHandle,
        shape: ObjectHandle,
    },

    /// Exclusive shape already has an owner
    #[error("Exclusive shape {shape} is already owned by actor {owner}")]
    ExclusiveShape {
        shape: ObjectHandle,
        owner: ObjectHandle,
    },

    /// The shape-to-geometry edge is replaced, never added or removed
    #[error("Shape {shape} always references exactly one geometry; replace it with set_geometry")]
    GeometryEdge { shape: ObjectHandle },

    /// Material is not referenced by this shape
    #[error("Material {material} is not used by shape {shape}")]
    MaterialNotUsed {
        shape: ObjectHandle,
        material: ObjectHandle,
    },

    /// Object descriptor failed validation
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Physics configuration failed validation
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// A reference count was about to leave its valid range
    #[error("Reference count violation on {handle}: {detail}")]
    ReferenceCount {
        handle: ObjectHandle,
        detail: &'static str,
    },
}

impl PhysicsError {
    /// Severity this error is reported at on the diagnostic channel
    pub fn severity(&self) -> Severity {
        match self {
            PhysicsError::Alloc(_) => Severity::OutOfMemory,
            PhysicsError::TypeRegistration(_) => Severity::Abort,
            PhysicsError::StaleHandle(_) | PhysicsError::ReferenceCount { .. } => {
                Severity::InternalError
            }
            PhysicsError::WrongType { .. }
            | PhysicsError::InvalidEdge { .. }
            | PhysicsError::InvalidDescriptor(_)
            | PhysicsError::InvalidConfig(_) => Severity::InvalidParameter,
            PhysicsError::FoundationExists
            | PhysicsError::FoundationInUse(_)
            | PhysicsError::AlreadyAttached { .. }
            | PhysicsError::NotAttached { .. }
            | PhysicsError::ExclusiveShape { .. }
            | PhysicsError::GeometryEdge { .. }
            | PhysicsError::MaterialNotUsed { .. } => Severity::InvalidOperation,
        }
    }

    /// Whether this error is a broken lifetime invariant
    pub fn is_lifetime_violation(&self) -> bool {
        matches!(
            self,
            PhysicsError::StaleHandle(_) | PhysicsError::ReferenceCount { .. }
        )
    }
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
