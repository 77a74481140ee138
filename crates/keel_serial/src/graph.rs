//! The persisted form of an object graph
//!
//! A [`PersistedGraph`] lists typed objects and the directed ownership edges
//! between them. Payloads never contain handles: which mesh a shape uses and
//! which materials it carries are expressed only as edges, so the edge list
//! is the single source of truth for reference counts.

use std::fmt;

use keel_core::{ConcreteType, ConcreteTypeId};
use keel_physics::{
    ConvexMeshDesc, Geometry, GeometryKind, HeightFieldDesc, MaterialDesc, Pose,
    RigidDynamicDesc, RigidStaticDesc, Shape, TriangleMeshDesc,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SerialError};

/// Current encoding version
pub const FORMAT_VERSION: u32 = 1;

/// Identity of an object within one persisted graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerialId(pub u64);

impl fmt::Display for SerialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Geometry parameters with the resource reference stripped out
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GeometryParams {
    Sphere { radius: f32 },
    Box { half_extents: [f32; 3] },
    Capsule { radius: f32, half_height: f32 },
    Plane,
    TriangleMesh { scale: [f32; 3] },
    ConvexMesh { scale: [f32; 3] },
    HeightField {
        height_scale: f32,
        row_scale: f32,
        column_scale: f32,
    },
}

impl GeometryParams {
    pub fn from_geometry(geometry: &Geometry) -> Self {
        match *geometry {
            Geometry::Sphere { radius } => GeometryParams::Sphere { radius },
            Geometry::Box { half_extents } => GeometryParams::Box { half_extents },
            Geometry::Capsule {
                radius,
                half_height,
            } => GeometryParams::Capsule {
                radius,
                half_height,
            },
            Geometry::Plane => GeometryParams::Plane,
            Geometry::TriangleMesh { scale, .. } => GeometryParams::TriangleMesh { scale },
            Geometry::ConvexMesh { scale, .. } => GeometryParams::ConvexMesh { scale },
            Geometry::HeightField {
                height_scale,
                row_scale,
                column_scale,
                ..
            } => GeometryParams::HeightField {
                height_scale,
                row_scale,
                column_scale,
            },
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            GeometryParams::Sphere { .. } => GeometryKind::Sphere,
            GeometryParams::Box { .. } => GeometryKind::Box,
            GeometryParams::Capsule { .. } => GeometryKind::Capsule,
            GeometryParams::Plane => GeometryKind::Plane,
            GeometryParams::TriangleMesh { .. } => GeometryKind::TriangleMesh,
            GeometryParams::ConvexMesh { .. } => GeometryKind::ConvexMesh,
            GeometryParams::HeightField { .. } => GeometryKind::HeightField,
        }
    }

    /// The resource type the geometry edge must target, if any
    pub fn resource_type(&self) -> Option<ConcreteType> {
        match self {
            GeometryParams::TriangleMesh { .. } => Some(ConcreteType::TriangleMesh),
            GeometryParams::ConvexMesh { .. } => Some(ConcreteType::ConvexMesh),
            GeometryParams::HeightField { .. } => Some(ConcreteType::HeightField),
            _ => None,
        }
    }
}

/// Shape state without its edges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapePayload {
    pub geometry: GeometryParams,
    pub exclusive: bool,
    pub local_pose: Pose,
    pub contact_offset: f32,
    pub rest_offset: f32,
}

impl ShapePayload {
    pub fn from_shape(shape: &Shape) -> Self {
        Self {
            geometry: GeometryParams::from_geometry(shape.geometry()),
            exclusive: shape.is_exclusive(),
            local_pose: shape.local_pose(),
            contact_offset: shape.contact_offset(),
            rest_offset: shape.rest_offset(),
        }
    }
}

/// Per-type object state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    TriangleMesh(TriangleMeshDesc),
    ConvexMesh(ConvexMeshDesc),
    HeightField(HeightFieldDesc),
    Material(MaterialDesc),
    Shape(ShapePayload),
    RigidStatic(RigidStaticDesc),
    RigidDynamic(RigidDynamicDesc),
}

impl Payload {
    pub fn concrete_type(&self) -> ConcreteType {
        match self {
            Payload::TriangleMesh(_) => ConcreteType::TriangleMesh,
            Payload::ConvexMesh(_) => ConcreteType::ConvexMesh,
            Payload::HeightField(_) => ConcreteType::HeightField,
            Payload::Material(_) => ConcreteType::Material,
            Payload::Shape(_) => ConcreteType::Shape,
            Payload::RigidStatic(_) => ConcreteType::RigidStatic,
            Payload::RigidDynamic(_) => ConcreteType::RigidDynamic,
        }
    }
}

/// One persisted object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedObject {
    pub id: SerialId,
    pub type_id: ConcreteTypeId,
    pub name: Option<String>,
    pub payload: Payload,
}

impl PersistedObject {
    /// Object whose type id is taken from its payload
    pub fn new(id: SerialId, payload: Payload) -> Self {
        Self {
            id,
            type_id: payload.concrete_type().id(),
            name: None,
            payload,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A directed ownership edge; `owner` holds one reference to `target`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistedEdge {
    pub owner: SerialId,
    pub target: SerialId,
}

impl PersistedEdge {
    pub fn new(owner: SerialId, target: SerialId) -> Self {
        Self { owner, target }
    }
}

/// Typed objects plus the edges between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedGraph {
    pub version: u32,
    pub objects: Vec<PersistedObject>,
    /// Shape material order follows edge order
    pub edges: Vec<PersistedEdge>,
}

impl PersistedGraph {
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            objects: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn push_object(&mut self, object: PersistedObject) -> SerialId {
        let id = object.id;
        self.objects.push(object);
        id
    }

    pub fn push_edge(&mut self, owner: SerialId, target: SerialId) {
        self.edges.push(PersistedEdge::new(owner, target));
    }

    pub fn object(&self, id: SerialId) -> Option<&PersistedObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    /// Incoming edges to `id`
    pub fn incoming(&self, id: SerialId) -> usize {
        self.edges.iter().filter(|edge| edge.target == id).count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Encode with bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode with bincode, rejecting other format versions
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let graph: PersistedGraph = bincode::deserialize(bytes)?;
        if graph.version != FORMAT_VERSION {
            return Err(SerialError::UnsupportedVersion {
                found: graph.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedGraph {
        let mut graph = PersistedGraph::new();
        let material = graph.push_object(
            PersistedObject::new(SerialId(1), Payload::Material(MaterialDesc::ice()))
                .with_name("ice"),
        );
        let shape = graph.push_object(PersistedObject::new(
            SerialId(2),
            Payload::Shape(ShapePayload {
                geometry: GeometryParams::Sphere { radius: 0.5 },
                exclusive: true,
                local_pose: Pose::IDENTITY,
                contact_offset: 0.02,
                rest_offset: 0.0,
            }),
        ));
        graph.push_edge(shape, material);
        graph
    }

    #[test]
    fn test_type_id_follows_payload() {
        let graph = sample();
        assert_eq!(graph.objects[0].type_id, ConcreteType::Material.id());
        assert_eq!(graph.objects[1].type_id, ConcreteType::Shape.id());
        assert_eq!(graph.incoming(SerialId(1)), 1);
        assert_eq!(graph.incoming(SerialId(2)), 0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let graph = sample();
        let bytes = graph.to_bytes().unwrap();
        assert_eq!(PersistedGraph::from_bytes(&bytes).unwrap(), graph);
    }

    #[test]
    fn test_other_version_rejected() {
        let mut graph = sample();
        graph.version = FORMAT_VERSION + 1;
        let bytes = graph.to_bytes().unwrap();
        assert!(matches!(
            PersistedGraph::from_bytes(&bytes),
            Err(SerialError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let bytes = sample().to_bytes().unwrap();
        let result = PersistedGraph::from_bytes(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(SerialError::Encoding(_))));
    }

    #[test]
    fn test_geometry_params_strip_resources() {
        let params = GeometryParams::from_geometry(&Geometry::capsule(0.25, 1.0));
        assert_eq!(params.kind(), GeometryKind::Capsule);
        assert_eq!(params.resource_type(), None);
        let params = GeometryParams::HeightField {
            height_scale: 1.0,
            row_scale: 1.0,
            column_scale: 1.0,
        };
        assert_eq!(params.resource_type(), Some(ConcreteType::HeightField));
    }
}
