//! # keel_serial - Persisted Object Graphs
//!
//! Turns live physics objects into a [`PersistedGraph`] of typed objects and
//! directed ownership edges, and turns such a graph back into live objects.
//!
//! Reconstruction never replays attach/detach traffic. Every shareable object
//! is inserted with its final reference count, one for the caller plus one
//! per incoming persisted edge, in a single batch:
//!
//! ```text
//!   mesh #1 ◄── shape #2 ◄── actor #4        mesh #1:  1 + 2 = 3
//!       ▲                                    shape #2: 1 + 1 = 2
//!       └────── shape #3                     shape #3: 1 + 0 = 1
//! ```
//!
//! # Example
//!
//! ```ignore
//! use keel_serial::prelude::*;
//!
//! let graph = collect(&physics, &[ground.raw()])?;
//! let bytes = graph.to_bytes()?;
//!
//! let restored = reconcile(&physics, &PersistedGraph::from_bytes(&bytes)?)?;
//! ```

pub mod collect;
pub mod error;
pub mod graph;
pub mod reconcile;

pub use collect::{collect, Collector};
pub use error::{Result, SerialError};
pub use graph::{
    GeometryParams, Payload, PersistedEdge, PersistedGraph, PersistedObject, SerialId,
    ShapePayload, FORMAT_VERSION,
};
pub use reconcile::{reconcile, Reconciled, Reconciler};

pub mod prelude {
    //! Common imports for persisting and restoring graphs
    pub use crate::collect::{collect, Collector};
    pub use crate::error::SerialError;
    pub use crate::graph::{Payload, PersistedGraph, PersistedObject, SerialId};
    pub use crate::reconcile::{reconcile, Reconciled, Reconciler};
}
