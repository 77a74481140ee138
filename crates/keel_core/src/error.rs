//! Error types for the core library

use thiserror::Error;

use crate::types::ConcreteTypeId;

/// Type registration errors
///
/// All of these are configuration mistakes detected while the registry is
/// being built; none can occur once it is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeRegistryError {
    /// Two leaf types claimed the same id
    #[error("Concrete type id {id} registered twice ('{existing}' and '{name}')")]
    DuplicateId {
        id: ConcreteTypeId,
        existing: &'static str,
        name: &'static str,
    },

    /// A type name was declared twice
    #[error("Type name already registered: {0}")]
    DuplicateName(&'static str),

    /// A type named a parent that was never declared
    #[error("Type '{name}' declares unknown parent '{parent}'")]
    UnknownParent {
        name: &'static str,
        parent: &'static str,
    },
}

/// Result type for registry operations
pub type Result<T> = core::result::Result<T, TypeRegistryError>;
