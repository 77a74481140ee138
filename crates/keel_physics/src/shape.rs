//! Shapes: geometry plus materials, attachable to actors
//!
//! A shape holds one counted reference to its geometry's resource (if the
//! geometry has one) and one to every material in its list. Attaching a shape
//! to an actor adds one reference to the shape itself.

use keel_core::{AnyActor, Handle, ObjectHandle};

use crate::config::TolerancesScale;
use crate::error::{PhysicsError, Result};
use crate::geometry::{Geometry, Pose};
use crate::material::Material;

/// Shape creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDesc {
    pub geometry: Geometry,
    pub materials: Vec<Handle<Material>>,
    /// Exclusive shapes attach to at most one actor
    pub exclusive: bool,
    pub local_pose: Pose,
    /// Defaults to the tolerance-derived contact offset
    pub contact_offset: Option<f32>,
    pub rest_offset: f32,
}

impl ShapeDesc {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            materials: Vec::new(),
            exclusive: true,
            local_pose: Pose::IDENTITY,
            contact_offset: None,
            rest_offset: 0.0,
        }
    }

    pub fn with_material(mut self, material: Handle<Material>) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_materials(mut self, materials: &[Handle<Material>]) -> Self {
        self.materials.extend_from_slice(materials);
        self
    }

    /// Allow the shape to be attached to several actors
    pub fn shared(mut self) -> Self {
        self.exclusive = false;
        self
    }

    pub fn with_local_pose(mut self, pose: Pose) -> Self {
        self.local_pose = pose;
        self
    }

    pub fn with_contact_offset(mut self, offset: f32) -> Self {
        self.contact_offset = Some(offset);
        self
    }

    pub fn with_rest_offset(mut self, offset: f32) -> Self {
        self.rest_offset = offset;
        self
    }

    /// Check everything that does not need the object table
    pub fn validate(&self, tolerances: &TolerancesScale) -> Result<()> {
        self.geometry.validate()?;
        if !self.local_pose.is_valid() {
            return Err(PhysicsError::InvalidDescriptor(
                "shape local pose is not a valid transform".into(),
            ));
        }
        let contact = self.resolved_contact_offset(tolerances);
        if !contact.is_finite() || !self.rest_offset.is_finite() || self.rest_offset >= contact {
            return Err(PhysicsError::InvalidDescriptor(format!(
                "rest offset {} must be below contact offset {contact}",
                self.rest_offset
            )));
        }
        Ok(())
    }

    fn resolved_contact_offset(&self, tolerances: &TolerancesScale) -> f32 {
        self.contact_offset
            .unwrap_or_else(|| tolerances.default_contact_offset())
    }
}

/// Shape object state
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub(crate) geometry: Geometry,
    pub(crate) materials: Vec<Handle<Material>>,
    pub(crate) exclusive: bool,
    pub(crate) local_pose: Pose,
    pub(crate) contact_offset: f32,
    pub(crate) rest_offset: f32,
    pub(crate) actors: Vec<Handle<AnyActor>>,
}

impl Shape {
    pub(crate) fn from_desc(desc: &ShapeDesc, tolerances: &TolerancesScale) -> Self {
        Self {
            geometry: desc.geometry,
            materials: desc.materials.clone(),
            exclusive: desc.exclusive,
            local_pose: desc.local_pose,
            contact_offset: desc.resolved_contact_offset(tolerances),
            rest_offset: desc.rest_offset,
            actors: Vec::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn materials(&self) -> &[Handle<Material>] {
        &self.materials
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn local_pose(&self) -> Pose {
        self.local_pose
    }

    pub fn contact_offset(&self) -> f32 {
        self.contact_offset
    }

    pub fn rest_offset(&self) -> f32 {
        self.rest_offset
    }

    /// Actors this shape is attached to
    pub fn actors(&self) -> &[Handle<AnyActor>] {
        &self.actors
    }

    /// Every object this shape holds a counted reference to
    pub fn counted_targets(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.geometry
            .resource()
            .into_iter()
            .chain(self.materials.iter().map(|m| m.raw()))
    }

    /// Descriptor that recreates this shape with the same targets
    pub fn to_desc(&self) -> ShapeDesc {
        ShapeDesc {
            geometry: self.geometry,
            materials: self.materials.clone(),
            exclusive: self.exclusive,
            local_pose: self.local_pose,
            contact_offset: Some(self.contact_offset),
            rest_offset: self.rest_offset,
        }
    }
}
