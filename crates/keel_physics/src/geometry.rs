//! Geometry descriptions and poses
//!
//! Simple primitives are plain values. Mesh and height-field geometries name
//! a shared resource by handle; a shape holding such a geometry holds one
//! counted reference to that resource.

use keel_core::{Handle, ObjectHandle};
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};
use crate::resource::{ConvexMesh, HeightField, TriangleMesh};

/// Rigid transform: position plus unit quaternion `[x, y, z, w]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn new(position: [f32; 3], rotation: [f32; 4]) -> Self {
        Self { position, rotation }
    }

    /// Finite position and a rotation of unit length
    pub fn is_valid(&self) -> bool {
        let finite = self.position.iter().chain(&self.rotation).all(|v| v.is_finite());
        let norm_sq: f32 = self.rotation.iter().map(|v| v * v).sum();
        finite && (norm_sq - 1.0).abs() < 1e-3
    }
}

/// Discriminant of [`Geometry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Sphere,
    Box,
    Capsule,
    Plane,
    TriangleMesh,
    ConvexMesh,
    HeightField,
}

/// Collision geometry carried by a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: [f32; 3],
    },
    Capsule {
        radius: f32,
        half_height: f32,
    },
    /// Half-space below the local YZ plane
    Plane,
    TriangleMesh {
        mesh: Handle<TriangleMesh>,
        scale: [f32; 3],
    },
    ConvexMesh {
        mesh: Handle<ConvexMesh>,
        scale: [f32; 3],
    },
    HeightField {
        field: Handle<HeightField>,
        height_scale: f32,
        row_scale: f32,
        column_scale: f32,
    },
}

impl Geometry {
    pub fn sphere(radius: f32) -> Self {
        Geometry::Sphere { radius }
    }

    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Geometry::Box {
            half_extents: [hx, hy, hz],
        }
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Geometry::Capsule {
            radius,
            half_height,
        }
    }

    /// Unscaled triangle mesh geometry
    pub fn triangle_mesh(mesh: Handle<TriangleMesh>) -> Self {
        Geometry::TriangleMesh {
            mesh,
            scale: [1.0; 3],
        }
    }

    /// Unscaled convex mesh geometry
    pub fn convex_mesh(mesh: Handle<ConvexMesh>) -> Self {
        Geometry::ConvexMesh {
            mesh,
            scale: [1.0; 3],
        }
    }

    pub fn height_field(field: Handle<HeightField>) -> Self {
        Geometry::HeightField {
            field,
            height_scale: 1.0,
            row_scale: 1.0,
            column_scale: 1.0,
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Sphere { .. } => GeometryKind::Sphere,
            Geometry::Box { .. } => GeometryKind::Box,
            Geometry::Capsule { .. } => GeometryKind::Capsule,
            Geometry::Plane => GeometryKind::Plane,
            Geometry::TriangleMesh { .. } => GeometryKind::TriangleMesh,
            Geometry::ConvexMesh { .. } => GeometryKind::ConvexMesh,
            Geometry::HeightField { .. } => GeometryKind::HeightField,
        }
    }

    /// The shared resource this geometry references, if any
    pub fn resource(&self) -> Option<ObjectHandle> {
        match self {
            Geometry::TriangleMesh { mesh, .. } => Some(mesh.raw()),
            Geometry::ConvexMesh { mesh, .. } => Some(mesh.raw()),
            Geometry::HeightField { field, .. } => Some(field.raw()),
            _ => None,
        }
    }

    /// Check the numeric parameters; resource liveness is checked by the owner table
    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            Geometry::Sphere { radius } => positive(radius),
            Geometry::Box { half_extents } => half_extents.iter().all(|v| positive(*v)),
            Geometry::Capsule {
                radius,
                half_height,
            } => positive(radius) && positive(half_height),
            Geometry::Plane => true,
            Geometry::TriangleMesh { scale, .. } | Geometry::ConvexMesh { scale, .. } => {
                scale.iter().all(|v| positive(*v))
            }
            Geometry::HeightField {
                height_scale,
                row_scale,
                column_scale,
                ..
            } => positive(height_scale) && positive(row_scale) && positive(column_scale),
        };

        if ok {
            Ok(())
        } else {
            Err(PhysicsError::InvalidDescriptor(format!(
                "{:?} geometry has non-positive or non-finite dimensions",
                self.kind()
            )))
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
