//! # keel_core - Keel Foundation Core
//!
//! Core primitives shared by every Keel crate:
//! - **Type identity**: the fixed object hierarchy, stable concrete type ids
//!   and the frozen [`TypeRegistry`] answering kind-of and downcast queries
//! - **Handles**: generational [`ObjectHandle`]s and typed [`Handle`]s that
//!   detect use after destruction
//! - **Diagnostics**: the severity taxonomy and the [`DiagnosticChannel`]
//!   every component reports through

extern crate alloc;

pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use diagnostics::*;
pub use error::TypeRegistryError;
pub use handle::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::diagnostics::{
        AssertHandler, DiagnosticChannel, ErrorCallback, LogErrorCallback, Severity,
        SourceLocation,
    };
    pub use crate::handle::{Handle, ObjectHandle};
    pub use crate::types::{
        ActorKind, AnyActor, AnyObject, AnyRefCounted, AnyRigidActor, AnyRigidBody,
        ConcreteType, ConcreteTypeId, ObjectType, RefCountedKind, TypeRegistry,
    };
}
