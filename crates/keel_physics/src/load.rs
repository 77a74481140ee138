//! Bulk reconstruction with caller-supplied reference counts
//!
//! A [`LoadBatch`] inserts objects whose final counts are already known, so
//! no attach/detach traffic is replayed. Edges named in the inserted objects
//! are linked but not counted; the caller accounts for them in the counts it
//! passes. Everything happens under a single write lock.

use keel_core::{Handle, ObjectHandle, RefCountedKind, SourceLocation};

use crate::actor::{RigidDynamic, RigidDynamicDesc, RigidStatic, RigidStaticDesc};
use crate::error::{PhysicsError, Result};
use crate::material::{Material, MaterialDesc};
use crate::object::{Concrete, ObjectData, ObjectEntry};
use crate::physics::{link_shape, unlink_shape, ObjectTable, Physics};
use crate::resource::{
    ConvexMesh, ConvexMeshDesc, HeightField, HeightFieldDesc, TriangleMesh, TriangleMeshDesc,
};
use crate::shape::{Shape, ShapeDesc};

/// Objects inserted by one [`Physics::load`] call
pub struct LoadBatch<'a> {
    physics: &'a Physics,
    table: &'a mut ObjectTable,
    location: SourceLocation,
    created: Vec<ObjectHandle>,
    /// References added to objects that existed before the batch
    external_refs: Vec<(ObjectHandle, u32)>,
    /// Actor links made onto shapes that existed before the batch
    external_links: Vec<(ObjectHandle, ObjectHandle)>,
}

impl<'a> LoadBatch<'a> {
    pub(crate) fn new(
        physics: &'a Physics,
        table: &'a mut ObjectTable,
        location: SourceLocation,
    ) -> Self {
        Self {
            physics,
            table,
            location,
            created: Vec::new(),
            external_refs: Vec::new(),
            external_links: Vec::new(),
        }
    }

    pub fn insert_triangle_mesh(
        &mut self,
        desc: &TriangleMeshDesc,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<TriangleMesh>> {
        self.check(desc.validate())?;
        let data = ObjectData::TriangleMesh(TriangleMesh::from_desc(desc));
        self.insert(data, name, reference_count)
    }

    pub fn insert_convex_mesh(
        &mut self,
        desc: &ConvexMeshDesc,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<ConvexMesh>> {
        self.check(desc.validate())?;
        let data = ObjectData::ConvexMesh(ConvexMesh::from_desc(desc));
        self.insert(data, name, reference_count)
    }

    pub fn insert_height_field(
        &mut self,
        desc: &HeightFieldDesc,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<HeightField>> {
        self.check(desc.validate())?;
        let data = ObjectData::HeightField(HeightField::from_desc(desc));
        self.insert(data, name, reference_count)
    }

    pub fn insert_material(
        &mut self,
        desc: &MaterialDesc,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<Material>> {
        self.check(desc.validate())?;
        self.insert(ObjectData::Material(Material::from_desc(desc)), name, reference_count)
    }

    /// Insert a shape whose geometry and materials are already live
    pub fn insert_shape(
        &mut self,
        desc: &ShapeDesc,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<Shape>> {
        let tolerances = *self.physics.tolerances();
        self.check(desc.validate(&tolerances))?;
        self.physics
            .check_geometry_target(self.table, &desc.geometry, self.location)?;
        self.physics
            .check_material_targets(self.table, &desc.materials, self.location)?;

        let shape = Shape::from_desc(desc, &tolerances);
        self.insert(ObjectData::Shape(shape), name, reference_count)
    }

    /// Insert a static actor already holding `shapes`
    pub fn insert_rigid_static(
        &mut self,
        desc: &RigidStaticDesc,
        shapes: &[Handle<Shape>],
        name: Option<&str>,
    ) -> Result<Handle<RigidStatic>> {
        self.check(desc.validate())?;
        let actor = self.insert(ObjectData::RigidStatic(RigidStatic::from_desc(desc)), name, 0)?;
        self.link_all(actor.raw(), shapes)?;
        Ok(actor)
    }

    /// Insert a dynamic body already holding `shapes`
    pub fn insert_rigid_dynamic(
        &mut self,
        desc: &RigidDynamicDesc,
        shapes: &[Handle<Shape>],
        name: Option<&str>,
    ) -> Result<Handle<RigidDynamic>> {
        self.check(desc.validate())?;
        let body = RigidDynamic::from_desc(desc, self.physics.tolerances());
        let actor = self.insert(ObjectData::RigidDynamic(body), name, 0)?;
        self.link_all(actor.raw(), shapes)?;
        Ok(actor)
    }

    /// Add `count` references to an object that outlives the batch
    pub fn add_references<T: RefCountedKind>(&mut self, handle: Handle<T>, count: u32) -> Result<()> {
        let handle = handle.raw();
        self.physics.lookup::<T>(self.table, handle, self.location)?;
        self.physics
            .add_references(self.table, handle, count, self.location)?;
        if !self.created.contains(&handle) {
            self.external_refs.push((handle, count));
        }
        Ok(())
    }

    /// Handles inserted so far, in insertion order
    pub fn created(&self) -> &[ObjectHandle] {
        &self.created
    }

    fn check(&self, result: Result<()>) -> Result<()> {
        result.map_err(|error| self.physics.report(error, self.location))
    }

    fn insert<T: Concrete>(
        &mut self,
        data: ObjectData,
        name: Option<&str>,
        reference_count: u32,
    ) -> Result<Handle<T>> {
        let shareable = T::TYPE.is_shareable();
        if shareable && reference_count == 0 {
            let error = PhysicsError::InvalidDescriptor(format!(
                "loaded {} needs a reference count of at least 1",
                T::NAME
            ));
            return Err(self.physics.report(error, self.location));
        }

        let count = if shareable { reference_count } else { 0 };
        let entry = ObjectEntry::new(data, name, count);
        let boxed = self.physics.allocate(entry, self.location)?;
        let handle = self.table.objects.insert(boxed);
        self.created.push(handle);
        Ok(Handle::from_raw_unchecked(handle))
    }

    fn link_all(&mut self, actor: ObjectHandle, shapes: &[Handle<Shape>]) -> Result<()> {
        for shape in shapes {
            let shape = shape.raw();
            self.physics
                .check_attachable(self.table, actor, shape, self.location)?;
            link_shape(self.table, actor, shape);
            if !self.created.contains(&shape) {
                self.external_links.push((actor, shape));
            }
        }
        Ok(())
    }

    pub(crate) fn commit(self) {
        log::info!(
            "Loaded {} objects ({} external references)",
            self.created.len(),
            self.external_refs.iter().map(|(_, n)| u64::from(*n)).sum::<u64>()
        );
    }

    /// Undo everything the batch did, leaving the table as it was
    pub(crate) fn rollback(self) {
        for (handle, count) in self.external_refs.iter().rev() {
            if let Some(entry) = self.table.entry_mut(*handle) {
                entry.ref_count = entry.ref_count.saturating_sub(*count);
            }
        }
        for (actor, shape) in self.external_links.iter().rev() {
            unlink_shape(self.table, *actor, *shape);
        }
        for handle in self.created.iter().rev() {
            self.table.objects.remove(*handle);
            self.table.user_data.remove(handle);
        }
        log::warn!("Rolled back load of {} objects", self.created.len());
    }
}
