//! # keel_physics - Shared Physics Objects
//!
//! The object layer of the Keel kernel: immutable collision resources shared
//! by many shapes, shapes attached to actors, and deterministic reference
//! counted lifetime for all of them.
//!
//! # Features
//!
//! - Process-unique [`Foundation`] holding the allocation gateway, the
//!   diagnostic channel and the type registry
//! - Triangle meshes, convex meshes, height fields and materials created with
//!   a count of one and destroyed synchronously when it reaches zero
//! - Counted ownership edges: actor to shape, shape to geometry and materials
//! - Safe downcasting and kind-of queries over the fixed type hierarchy
//! - Shared read views for parallel traversal
//! - Bulk loading with caller-supplied counts ([`LoadBatch`])
//!
//! # Lifecycle
//!
//! ```text
//!   create ──► count = 1
//!                 │  attach / acquire_reference   (+1)
//!                 │  detach / release             (-1)
//!                 ▼
//!             count = 0 ──► destroyed on the calling thread,
//!                           outgoing edges released in turn
//! ```
//!
//! # Example
//!
//! ```ignore
//! use keel_physics::prelude::*;
//!
//! let foundation = Foundation::with_defaults()?;
//! let physics = Physics::new(&foundation, PhysicsDesc::default())?;
//!
//! let mesh = physics.create_triangle_mesh(&mesh_desc)?;
//! let material = physics.create_material(&MaterialDesc::default())?;
//! let shape = physics.create_shape(
//!     &ShapeDesc::new(Geometry::triangle_mesh(mesh)).with_material(material),
//! )?;
//! let ground = physics.create_rigid_static(&RigidStaticDesc::default())?;
//! physics.attach_shape(ground, shape)?;
//!
//! // The actor now keeps the shape alive, and the shape the mesh
//! physics.release(shape)?;
//! physics.release(mesh)?;
//! physics.release(material)?;
//!
//! physics.release(ground)?; // everything is destroyed here
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod foundation;
pub mod geometry;
pub mod load;
pub mod material;
pub mod object;
pub mod physics;
pub mod resource;
pub mod shape;
pub mod view;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use actor::{RigidDynamic, RigidDynamicDesc, RigidStatic, RigidStaticDesc};
pub use config::{FoundationDesc, PhysicsDesc, TolerancesScale};
pub use error::{PhysicsError, Result};
pub use events::{DeletionEvent, DeletionListener, ReleaseEvent};
pub use foundation::Foundation;
pub use geometry::{Geometry, GeometryKind, Pose};
pub use load::LoadBatch;
pub use material::{CombineRule, Material, MaterialDesc};
pub use object::{Concrete, EdgeKind, ObjectData, ObjectRef};
pub use physics::{Physics, UserData};
pub use resource::{
    Bounds, ConvexMesh, ConvexMeshDesc, HeightField, HeightFieldDesc, TriangleMesh,
    TriangleMeshDesc,
};
pub use shape::{Shape, ShapeDesc};
pub use view::PhysicsRead;

pub mod prelude {
    //! Common imports for working with physics objects
    pub use crate::actor::{RigidDynamic, RigidDynamicDesc, RigidStatic, RigidStaticDesc};
    pub use crate::config::{FoundationDesc, PhysicsDesc, TolerancesScale};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::foundation::Foundation;
    pub use crate::geometry::{Geometry, Pose};
    pub use crate::material::{Material, MaterialDesc};
    pub use crate::physics::Physics;
    pub use crate::resource::{
        ConvexMesh, ConvexMeshDesc, HeightField, HeightFieldDesc, TriangleMesh, TriangleMeshDesc,
    };
    pub use crate::shape::{Shape, ShapeDesc};
    pub use keel_core::prelude::*;
}
