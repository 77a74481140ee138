//! The physics object table and every lifetime operation
//!
//! [`Physics`] owns all live objects. Reference counts are plain integers that
//! only change while the table's write lock is held; read-only traversal goes
//! through [`Physics::read`], so a lifetime mutation can never overlap an
//! in-flight traversal. Mutations simply wait for readers to finish.
//!
//! Destruction is synchronous: the decrement that reaches zero removes the
//! object, drops its outgoing edges (cascading into whatever they alone kept
//! alive) and frees its memory before the call returns. Deletion listeners
//! run afterwards on the same thread, once the lock is released.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use keel_core::{
    ActorKind, AnyActor, AnyObject, ConcreteType, Handle, HandleMap, ObjectHandle, ObjectType,
    RefCountedKind, SourceLocation, TypeRegistry,
};
use keel_memory::GatewayBox;

use crate::actor::{RigidDynamic, RigidDynamicDesc, RigidStatic, RigidStaticDesc};
use crate::config::{PhysicsDesc, TolerancesScale};
use crate::error::{PhysicsError, Result};
use crate::events::{DeletionEvent, DeletionListener, ReleaseEvent};
use crate::foundation::Foundation;
use crate::geometry::Geometry;
use crate::load::LoadBatch;
use crate::material::{Material, MaterialDesc};
use crate::object::{Concrete, EdgeKind, ObjectData, ObjectEntry};
use crate::resource::{
    ConvexMesh, ConvexMeshDesc, HeightField, HeightFieldDesc, TriangleMesh, TriangleMeshDesc,
};
use crate::shape::{Shape, ShapeDesc};
use crate::view::PhysicsRead;

/// Per-object host data
pub type UserData = Box<dyn Any + Send + Sync>;

/// Live objects plus their side tables
pub(crate) struct ObjectTable {
    pub(crate) objects: HandleMap<GatewayBox<ObjectEntry>>,
    pub(crate) user_data: HashMap<ObjectHandle, UserData>,
}

impl ObjectTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            objects: HandleMap::with_capacity(capacity),
            user_data: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn entry(&self, handle: ObjectHandle) -> Option<&ObjectEntry> {
        self.objects.get(handle).map(|boxed| &**boxed)
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, handle: ObjectHandle) -> Option<&mut ObjectEntry> {
        self.objects.get_mut(handle).map(|boxed| &mut **boxed)
    }
}

/// What a destruction cascade leaves to do once the lock is released
#[derive(Default)]
pub(crate) struct Teardown {
    events: Vec<ReleaseEvent>,
    orphaned: Vec<UserData>,
}

/// Owner of every resource, shape and actor
pub struct Physics {
    table: RwLock<ObjectTable>,
    listeners: RwLock<Vec<Arc<dyn DeletionListener>>>,
    desc: PhysicsDesc,
    foundation: Arc<Foundation>,
}

impl Physics {
    /// Create an empty object table bound to `foundation`
    #[track_caller]
    pub fn new(foundation: &Arc<Foundation>, desc: PhysicsDesc) -> Result<Self> {
        let location = SourceLocation::caller();
        if let Err(error) = desc.validate() {
            foundation
                .diagnostics()
                .report(error.severity(), &error.to_string(), location);
            return Err(error);
        }

        log::info!(
            "Physics created (length scale {}, speed scale {})",
            desc.tolerances.length,
            desc.tolerances.speed
        );

        Ok(Self {
            table: RwLock::new(ObjectTable::with_capacity(desc.initial_capacity)),
            listeners: RwLock::new(Vec::new()),
            desc,
            foundation: foundation.clone(),
        })
    }

    pub fn foundation(&self) -> &Arc<Foundation> {
        &self.foundation
    }

    pub fn desc(&self) -> &PhysicsDesc {
        &self.desc
    }

    pub fn tolerances(&self) -> &TolerancesScale {
        &self.desc.tolerances
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.foundation.registry()
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    #[track_caller]
    pub fn create_triangle_mesh(&self, desc: &TriangleMeshDesc) -> Result<Handle<TriangleMesh>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        self.insert(ObjectData::TriangleMesh(TriangleMesh::from_desc(desc)), location)
    }

    #[track_caller]
    pub fn create_convex_mesh(&self, desc: &ConvexMeshDesc) -> Result<Handle<ConvexMesh>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        self.insert(ObjectData::ConvexMesh(ConvexMesh::from_desc(desc)), location)
    }

    #[track_caller]
    pub fn create_height_field(&self, desc: &HeightFieldDesc) -> Result<Handle<HeightField>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        self.insert(ObjectData::HeightField(HeightField::from_desc(desc)), location)
    }

    #[track_caller]
    pub fn create_material(&self, desc: &MaterialDesc) -> Result<Handle<Material>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        self.insert(ObjectData::Material(Material::from_desc(desc)), location)
    }

    /// Create a shape holding one reference to its geometry resource and
    /// one to each listed material
    #[track_caller]
    pub fn create_shape(&self, desc: &ShapeDesc) -> Result<Handle<Shape>> {
        let location = SourceLocation::caller();
        desc.validate(&self.desc.tolerances)
            .map_err(|e| self.report(e, location))?;

        let shape = Shape::from_desc(desc, &self.desc.tolerances);
        let boxed = self.allocate(ObjectEntry::new(ObjectData::Shape(shape), None, 1), location)?;

        let handle = {
            let mut table = self.table.write();
            self.check_geometry_target(&table, &desc.geometry, location)?;
            self.check_material_targets(&table, &desc.materials, location)?;
            if let Some(resource) = desc.geometry.resource() {
                self.add_reference(&mut table, resource, location)?;
            }
            for material in &desc.materials {
                self.add_reference(&mut table, material.raw(), location)?;
            }
            table.objects.insert(boxed)
        };

        log::debug!("Created Shape {}", handle);
        Ok(Handle::from_raw_unchecked(handle))
    }

    #[track_caller]
    pub fn create_rigid_static(&self, desc: &RigidStaticDesc) -> Result<Handle<RigidStatic>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        self.insert(ObjectData::RigidStatic(RigidStatic::from_desc(desc)), location)
    }

    #[track_caller]
    pub fn create_rigid_dynamic(&self, desc: &RigidDynamicDesc) -> Result<Handle<RigidDynamic>> {
        let location = SourceLocation::caller();
        desc.validate().map_err(|e| self.report(e, location))?;
        let body = RigidDynamic::from_desc(desc, &self.desc.tolerances);
        self.insert(ObjectData::RigidDynamic(body), location)
    }

    fn insert<T: Concrete>(&self, data: ObjectData, location: SourceLocation) -> Result<Handle<T>> {
        let ref_count = u32::from(T::TYPE.is_shareable());
        let boxed = self.allocate(ObjectEntry::new(data, None, ref_count), location)?;
        let handle = self.table.write().objects.insert(boxed);
        log::debug!("Created {} {}", T::NAME, handle);
        Ok(Handle::from_raw_unchecked(handle))
    }

    /// Move an entry into gateway memory; exhaustion is already reported
    pub(crate) fn allocate(
        &self,
        entry: ObjectEntry,
        location: SourceLocation,
    ) -> Result<GatewayBox<ObjectEntry>> {
        let tag = entry.concrete_type().name();
        Ok(GatewayBox::new_at(
            self.foundation.gateway(),
            entry,
            tag,
            location,
        )?)
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Take an extra reference, typically before handing `handle` to
    /// another thread; pair it with [`release`](Self::release)
    #[track_caller]
    pub fn acquire_reference<T: RefCountedKind>(&self, handle: Handle<T>) -> Result<Handle<T>> {
        let location = SourceLocation::caller();
        let mut table = self.table.write();
        self.lookup::<T>(&table, handle.raw(), location)?;
        self.add_reference(&mut table, handle.raw(), location)?;
        Ok(handle)
    }

    /// Give up the caller's own reference
    ///
    /// Resources and shapes are destroyed when this was their last reference.
    /// Actors are not shared, so releasing one destroys it and drops its
    /// reference to each attached shape.
    #[track_caller]
    pub fn release<T: ObjectType>(&self, handle: Handle<T>) -> Result<()> {
        let location = SourceLocation::caller();
        let mut teardown = Teardown::default();
        let result = {
            let mut table = self.table.write();
            self.release_locked::<T>(&mut table, handle.raw(), location, &mut teardown)
        };
        self.finish(teardown);
        result
    }

    fn release_locked<T: ObjectType>(
        &self,
        table: &mut ObjectTable,
        handle: ObjectHandle,
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        let ty = self.lookup::<T>(table, handle, location)?.concrete_type();
        if ty.is_shareable() {
            self.drop_references(table, vec![handle], location, teardown)
        } else {
            let mut pending = Vec::new();
            self.destroy(table, handle, &mut pending, teardown);
            self.drop_references(table, pending, location, teardown)
        }
    }

    pub(crate) fn add_reference(
        &self,
        table: &mut ObjectTable,
        handle: ObjectHandle,
        location: SourceLocation,
    ) -> Result<u32> {
        self.add_references(table, handle, 1, location)
    }

    /// Add `count` references at once, or none if the count would overflow
    pub(crate) fn add_references(
        &self,
        table: &mut ObjectTable,
        handle: ObjectHandle,
        count: u32,
        location: SourceLocation,
    ) -> Result<u32> {
        let Some(entry) = table.entry_mut(handle) else {
            return Err(self.report(PhysicsError::StaleHandle(handle), location));
        };
        if !entry.concrete_type().is_shareable() {
            let found = entry.concrete_type().name();
            return Err(self.report(
                PhysicsError::WrongType {
                    handle,
                    expected: "RefCounted",
                    found,
                },
                location,
            ));
        }
        let Some(count) = entry.ref_count.checked_add(count) else {
            return Err(self.report(
                PhysicsError::ReferenceCount {
                    handle,
                    detail: "count overflow",
                },
                location,
            ));
        };
        entry.ref_count = count;
        Ok(count)
    }

    /// Decrement every handle in `pending`, destroying whatever reaches zero
    ///
    /// Destroyed objects push their own outgoing edges onto the worklist, so
    /// arbitrarily deep cascades run without recursion. A stale or exhausted
    /// reference is reported and skipped; the rest of the worklist still
    /// drains and the first violation is returned.
    fn drop_references(
        &self,
        table: &mut ObjectTable,
        mut pending: Vec<ObjectHandle>,
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        let mut violation = None;
        while let Some(handle) = pending.pop() {
            let error = match table.entry_mut(handle) {
                None => PhysicsError::StaleHandle(handle),
                Some(entry) if entry.ref_count == 0 => PhysicsError::ReferenceCount {
                    handle,
                    detail: "decrement below zero",
                },
                Some(entry) => {
                    entry.ref_count -= 1;
                    if entry.ref_count == 0 {
                        self.destroy(table, handle, &mut pending, teardown);
                    }
                    continue;
                }
            };
            let error = self.report(error, location);
            violation.get_or_insert(error);
        }
        violation.map_or(Ok(()), Err)
    }

    /// Remove one object and queue the references it held
    fn destroy(
        &self,
        table: &mut ObjectTable,
        handle: ObjectHandle,
        pending: &mut Vec<ObjectHandle>,
        teardown: &mut Teardown,
    ) {
        let Some(mut boxed) = table.objects.remove(handle) else {
            return;
        };
        if let Some(data) = table.user_data.remove(&handle) {
            teardown.orphaned.push(data);
        }

        match &mut boxed.data {
            ObjectData::Shape(shape) => pending.extend(shape.counted_targets()),
            data => {
                if let Some(shapes) = data.shapes_mut() {
                    for shape in shapes.drain(..) {
                        if let Some(attached) =
                            table.entry_mut(shape.raw()).and_then(|e| e.data.as_shape_mut())
                        {
                            attached.actors.retain(|actor| actor.raw() != handle);
                        }
                        pending.push(shape.raw());
                    }
                }
            }
        }

        let concrete_type = boxed.concrete_type();
        let name = boxed.name.as_deref().map(str::to_owned);
        drop(boxed);
        log::debug!("Destroyed {} {}", concrete_type, handle);

        for kind in [DeletionEvent::UserRelease, DeletionEvent::MemoryRelease] {
            teardown.events.push(ReleaseEvent {
                handle,
                concrete_type,
                name: name.clone(),
                kind,
            });
        }
    }

    /// Drop orphaned user data and notify listeners, outside the lock
    fn finish(&self, teardown: Teardown) {
        drop(teardown.orphaned);
        if teardown.events.is_empty() {
            return;
        }

        let listeners = self.listeners.read().clone();
        for event in &teardown.events {
            for listener in &listeners {
                if listener.wants(event.kind) {
                    listener.on_release(event);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Ownership edges
    // ------------------------------------------------------------------

    /// Create a counted edge from `owner` to `target`
    ///
    /// Supports actor to shape and shape to material. A shape's geometry is
    /// replaced through [`set_geometry`](Self::set_geometry).
    #[track_caller]
    pub fn attach(
        &self,
        owner: impl Into<ObjectHandle>,
        target: impl Into<ObjectHandle>,
    ) -> Result<()> {
        let location = SourceLocation::caller();
        let owner: ObjectHandle = owner.into();
        let target: ObjectHandle = target.into();
        let mut table = self.table.write();

        match self.classify(&table, owner, target, location)? {
            EdgeKind::ActorShape => self.attach_shape_locked(&mut table, owner, target, location),
            EdgeKind::ShapeMaterial => {
                self.add_material_locked(&mut table, owner, target, location)
            }
            EdgeKind::ShapeGeometry => Err(self.report(
                PhysicsError::GeometryEdge { shape: owner },
                location,
            )),
        }
    }

    /// Remove a counted edge from `owner` to `target`
    #[track_caller]
    pub fn detach(
        &self,
        owner: impl Into<ObjectHandle>,
        target: impl Into<ObjectHandle>,
    ) -> Result<()> {
        let location = SourceLocation::caller();
        let owner: ObjectHandle = owner.into();
        let target: ObjectHandle = target.into();
        let mut teardown = Teardown::default();

        let result = {
            let mut table = self.table.write();
            match self.classify(&table, owner, target, location) {
                Ok(EdgeKind::ActorShape) => {
                    self.detach_shape_locked(&mut table, owner, target, location, &mut teardown)
                }
                Ok(EdgeKind::ShapeMaterial) => {
                    self.remove_material_locked(&mut table, owner, target, location, &mut teardown)
                }
                Ok(EdgeKind::ShapeGeometry) => Err(self.report(
                    PhysicsError::GeometryEdge { shape: owner },
                    location,
                )),
                Err(error) => Err(error),
            }
        };

        self.finish(teardown);
        result
    }

    fn classify(
        &self,
        table: &ObjectTable,
        owner: ObjectHandle,
        target: ObjectHandle,
        location: SourceLocation,
    ) -> Result<EdgeKind> {
        let owner_type = self.lookup::<AnyObject>(table, owner, location)?.concrete_type();
        let target_type = self.lookup::<AnyObject>(table, target, location)?.concrete_type();
        EdgeKind::between(owner_type, target_type).ok_or_else(|| {
            self.report(
                PhysicsError::InvalidEdge {
                    owner: owner_type.name(),
                    target: target_type.name(),
                },
                location,
            )
        })
    }

    /// Attach `shape` to `actor`, adding one reference to the shape
    #[track_caller]
    pub fn attach_shape<A: ActorKind>(&self, actor: Handle<A>, shape: Handle<Shape>) -> Result<()> {
        let location = SourceLocation::caller();
        let mut table = self.table.write();
        self.lookup::<A>(&table, actor.raw(), location)?;
        self.attach_shape_locked(&mut table, actor.raw(), shape.raw(), location)
    }

    /// Detach `shape` from `actor`, dropping the actor's reference to it
    #[track_caller]
    pub fn detach_shape<A: ActorKind>(&self, actor: Handle<A>, shape: Handle<Shape>) -> Result<()> {
        let location = SourceLocation::caller();
        let mut teardown = Teardown::default();
        let result = {
            let mut table = self.table.write();
            let checked = self.lookup::<A>(&table, actor.raw(), location).map(drop);
            match checked {
                Ok(()) => self.detach_shape_locked(
                    &mut table,
                    actor.raw(),
                    shape.raw(),
                    location,
                    &mut teardown,
                ),
                Err(error) => Err(error),
            }
        };
        self.finish(teardown);
        result
    }

    fn attach_shape_locked(
        &self,
        table: &mut ObjectTable,
        actor: ObjectHandle,
        shape: ObjectHandle,
        location: SourceLocation,
    ) -> Result<()> {
        self.check_attachable(table, actor, shape, location)?;
        self.add_reference(table, shape, location)?;
        link_shape(table, actor, shape);
        Ok(())
    }

    /// Everything attaching `shape` to `actor` requires, short of counting
    pub(crate) fn check_attachable(
        &self,
        table: &ObjectTable,
        actor: ObjectHandle,
        shape: ObjectHandle,
        location: SourceLocation,
    ) -> Result<()> {
        let actor_entry = self.lookup::<AnyActor>(table, actor, location)?;
        let shape_entry = self.lookup::<Shape>(table, shape, location)?;

        let attached = actor_entry
            .data
            .shapes()
            .is_some_and(|shapes| shapes.iter().any(|s| s.raw() == shape));
        if attached {
            return Err(self.report(PhysicsError::AlreadyAttached { actor, shape }, location));
        }

        if let Some(existing) = shape_entry.data.as_shape() {
            if let (true, Some(owner)) = (existing.exclusive, existing.actors.first()) {
                return Err(self.report(
                    PhysicsError::ExclusiveShape {
                        shape,
                        owner: owner.raw(),
                    },
                    location,
                ));
            }
        }
        Ok(())
    }

    fn detach_shape_locked(
        &self,
        table: &mut ObjectTable,
        actor: ObjectHandle,
        shape: ObjectHandle,
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        self.lookup::<AnyActor>(table, actor, location)?;
        self.lookup::<Shape>(table, shape, location)?;

        let detached = table
            .entry_mut(actor)
            .and_then(|entry| entry.data.shapes_mut())
            .and_then(|shapes| {
                let position = shapes.iter().position(|s| s.raw() == shape)?;
                shapes.remove(position);
                Some(())
            })
            .is_some();
        if !detached {
            return Err(self.report(PhysicsError::NotAttached { actor, shape }, location));
        }

        unlink_shape(table, actor, shape);
        self.drop_references(table, vec![shape], location, teardown)
    }

    /// Replace a shape's geometry, counting the new resource before the old
    /// one is dropped
    #[track_caller]
    pub fn set_geometry(&self, shape: Handle<Shape>, geometry: Geometry) -> Result<()> {
        let location = SourceLocation::caller();
        geometry.validate().map_err(|e| self.report(e, location))?;

        let mut teardown = Teardown::default();
        let result = {
            let mut table = self.table.write();
            self.set_geometry_locked(&mut table, shape.raw(), geometry, location, &mut teardown)
        };
        self.finish(teardown);
        result
    }

    fn set_geometry_locked(
        &self,
        table: &mut ObjectTable,
        shape: ObjectHandle,
        geometry: Geometry,
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        self.lookup::<Shape>(table, shape, location)?;
        self.check_geometry_target(table, &geometry, location)?;
        if let Some(resource) = geometry.resource() {
            self.add_reference(table, resource, location)?;
        }

        let previous = table
            .entry_mut(shape)
            .and_then(|entry| entry.data.as_shape_mut())
            .map(|existing| std::mem::replace(&mut existing.geometry, geometry));
        let released = previous.and_then(|g| g.resource()).into_iter().collect();
        self.drop_references(table, released, location, teardown)
    }

    /// Replace a shape's material list, counting the new list before the
    /// old one is dropped
    #[track_caller]
    pub fn set_materials(&self, shape: Handle<Shape>, materials: &[Handle<Material>]) -> Result<()> {
        let location = SourceLocation::caller();
        let mut teardown = Teardown::default();
        let result = {
            let mut table = self.table.write();
            self.set_materials_locked(&mut table, shape.raw(), materials, location, &mut teardown)
        };
        self.finish(teardown);
        result
    }

    fn set_materials_locked(
        &self,
        table: &mut ObjectTable,
        shape: ObjectHandle,
        materials: &[Handle<Material>],
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        self.lookup::<Shape>(table, shape, location)?;
        self.check_material_targets(table, materials, location)?;
        for material in materials {
            self.add_reference(table, material.raw(), location)?;
        }

        let previous = table
            .entry_mut(shape)
            .and_then(|entry| entry.data.as_shape_mut())
            .map(|existing| std::mem::replace(&mut existing.materials, materials.to_vec()))
            .unwrap_or_default();
        let released = previous.iter().map(|m| m.raw()).collect();
        self.drop_references(table, released, location, teardown)
    }

    /// Append a material to a shape's list
    #[track_caller]
    pub fn add_material(&self, shape: Handle<Shape>, material: Handle<Material>) -> Result<()> {
        let location = SourceLocation::caller();
        let mut table = self.table.write();
        self.add_material_locked(&mut table, shape.raw(), material.raw(), location)
    }

    /// Remove one occurrence of a material from a shape's list
    #[track_caller]
    pub fn remove_material(&self, shape: Handle<Shape>, material: Handle<Material>) -> Result<()> {
        let location = SourceLocation::caller();
        let mut teardown = Teardown::default();
        let result = {
            let mut table = self.table.write();
            self.remove_material_locked(
                &mut table,
                shape.raw(),
                material.raw(),
                location,
                &mut teardown,
            )
        };
        self.finish(teardown);
        result
    }

    fn add_material_locked(
        &self,
        table: &mut ObjectTable,
        shape: ObjectHandle,
        material: ObjectHandle,
        location: SourceLocation,
    ) -> Result<()> {
        self.lookup::<Shape>(table, shape, location)?;
        self.lookup::<Material>(table, material, location)?;
        self.add_reference(table, material, location)?;
        if let Some(existing) = table.entry_mut(shape).and_then(|e| e.data.as_shape_mut()) {
            existing.materials.push(Handle::from_raw_unchecked(material));
        }
        Ok(())
    }

    fn remove_material_locked(
        &self,
        table: &mut ObjectTable,
        shape: ObjectHandle,
        material: ObjectHandle,
        location: SourceLocation,
        teardown: &mut Teardown,
    ) -> Result<()> {
        self.lookup::<Shape>(table, shape, location)?;
        self.lookup::<Material>(table, material, location)?;

        let removed = table
            .entry_mut(shape)
            .and_then(|entry| entry.data.as_shape_mut())
            .and_then(|existing| {
                let position = existing.materials.iter().position(|m| m.raw() == material)?;
                existing.materials.remove(position);
                Some(())
            })
            .is_some();
        if !removed {
            return Err(self.report(PhysicsError::MaterialNotUsed { shape, material }, location));
        }
        self.drop_references(table, vec![material], location, teardown)
    }

    pub(crate) fn check_geometry_target(
        &self,
        table: &ObjectTable,
        geometry: &Geometry,
        location: SourceLocation,
    ) -> Result<()> {
        match geometry {
            Geometry::TriangleMesh { mesh, .. } => {
                self.lookup::<TriangleMesh>(table, mesh.raw(), location)?;
            }
            Geometry::ConvexMesh { mesh, .. } => {
                self.lookup::<ConvexMesh>(table, mesh.raw(), location)?;
            }
            Geometry::HeightField { field, .. } => {
                self.lookup::<HeightField>(table, field.raw(), location)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn check_material_targets(
        &self,
        table: &ObjectTable,
        materials: &[Handle<Material>],
        location: SourceLocation,
    ) -> Result<()> {
        for material in materials {
            self.lookup::<Material>(table, material.raw(), location)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Shared traversal guard; lifetime mutations wait until it is dropped
    pub fn read(&self) -> PhysicsRead<'_> {
        PhysicsRead::new(self, self.table.read())
    }

    pub fn is_alive(&self, handle: impl Into<ObjectHandle>) -> bool {
        self.read().is_alive(handle)
    }

    /// Current count, `None` if the object is gone or not reference counted
    pub fn reference_count(&self, handle: impl Into<ObjectHandle>) -> Option<u32> {
        self.read().reference_count(handle)
    }

    pub fn concrete_type(&self, handle: impl Into<ObjectHandle>) -> Option<ConcreteType> {
        self.read().concrete_type(handle)
    }

    pub fn concrete_type_name(&self, handle: impl Into<ObjectHandle>) -> Option<&'static str> {
        self.concrete_type(handle).map(ConcreteType::name)
    }

    pub fn is_kind_of(&self, handle: impl Into<ObjectHandle>, name: &str) -> bool {
        self.read().is_kind_of(handle, name)
    }

    /// Typed handle to the same object if it is a `T`, `None` otherwise
    pub fn downcast<T: ObjectType>(&self, handle: impl Into<ObjectHandle>) -> Option<Handle<T>> {
        self.read().downcast(handle)
    }

    pub fn name(&self, handle: impl Into<ObjectHandle>) -> Option<String> {
        self.read().get(handle)?.name().map(str::to_owned)
    }

    #[track_caller]
    pub fn set_name(&self, handle: impl Into<ObjectHandle>, name: Option<&str>) -> Result<()> {
        let location = SourceLocation::caller();
        let handle: ObjectHandle = handle.into();
        let mut table = self.table.write();
        self.lookup::<AnyObject>(&table, handle, location)?;
        if let Some(entry) = table.entry_mut(handle) {
            entry.name = name.map(Into::into);
        }
        Ok(())
    }

    /// Attach host data to an object, replacing any previous value
    #[track_caller]
    pub fn set_user_data<T: Any + Send + Sync>(
        &self,
        handle: impl Into<ObjectHandle>,
        value: T,
    ) -> Result<()> {
        let location = SourceLocation::caller();
        let handle: ObjectHandle = handle.into();
        let previous = {
            let mut table = self.table.write();
            self.lookup::<AnyObject>(&table, handle, location)?;
            table.user_data.insert(handle, Box::new(value))
        };
        drop(previous);
        Ok(())
    }

    /// Run `f` on the object's host data if it is a `T`
    pub fn with_user_data<T: Any, R>(
        &self,
        handle: impl Into<ObjectHandle>,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        self.read().user_data::<T>(handle).map(f)
    }

    /// Remove and return the object's host data if it is a `T`
    pub fn take_user_data<T: Any + Send + Sync>(&self, handle: impl Into<ObjectHandle>) -> Option<T> {
        let handle: ObjectHandle = handle.into();
        let mut table = self.table.write();
        if !table.user_data.get(&handle)?.is::<T>() {
            return None;
        }
        let boxed = table.user_data.remove(&handle)?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    pub fn object_count(&self) -> usize {
        self.table.read().objects.len()
    }

    /// Number of live objects of one concrete type
    pub fn count_of(&self, ty: ConcreteType) -> usize {
        self.read().count_of(ty)
    }

    /// Handles to every live object that is a `T`
    pub fn objects_of<T: ObjectType>(&self) -> Vec<Handle<T>> {
        self.read().objects_of::<T>().collect()
    }

    pub fn add_deletion_listener(&self, listener: Arc<dyn DeletionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_deletion_listener(&self, listener: &Arc<dyn DeletionListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    // ------------------------------------------------------------------
    // Bulk load
    // ------------------------------------------------------------------

    /// Insert many objects under one write lock with caller-supplied counts
    ///
    /// If `build` fails, every object it inserted is removed again and every
    /// reference it added to pre-existing objects is taken back.
    #[track_caller]
    pub fn load<R, E>(
        &self,
        build: impl FnOnce(&mut LoadBatch<'_>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let location = SourceLocation::caller();
        let mut table = self.table.write();
        let mut batch = LoadBatch::new(self, &mut table, location);
        match build(&mut batch) {
            Ok(value) => {
                batch.commit();
                Ok(value)
            }
            Err(error) => {
                batch.rollback();
                Err(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Checks and reporting
    // ------------------------------------------------------------------

    /// Report `error` on the diagnostic channel and hand it back
    ///
    /// Lifetime violations go through the assert handler.
    pub(crate) fn report(&self, error: PhysicsError, location: SourceLocation) -> PhysicsError {
        let diagnostics = self.foundation.diagnostics();
        if error.is_lifetime_violation() {
            diagnostics.assert_failed(&error.to_string(), location);
        } else {
            diagnostics.report(error.severity(), &error.to_string(), location);
        }
        error
    }

    /// A live entry of kind `T`, or a reported error
    pub(crate) fn lookup<'t, T: ObjectType>(
        &self,
        table: &'t ObjectTable,
        handle: ObjectHandle,
        location: SourceLocation,
    ) -> Result<&'t ObjectEntry> {
        let Some(entry) = table.entry(handle) else {
            return Err(self.report(PhysicsError::StaleHandle(handle), location));
        };
        let ty = entry.concrete_type();
        if !T::matches(self.registry(), ty.id()) {
            return Err(self.report(
                PhysicsError::WrongType {
                    handle,
                    expected: T::NAME,
                    found: ty.name(),
                },
                location,
            ));
        }
        Ok(entry)
    }
}

/// Record `shape` on `actor` and `actor` on `shape`
pub(crate) fn link_shape(table: &mut ObjectTable, actor: ObjectHandle, shape: ObjectHandle) {
    if let Some(existing) = table.entry_mut(shape).and_then(|e| e.data.as_shape_mut()) {
        existing.actors.push(Handle::from_raw_unchecked(actor));
    }
    if let Some(shapes) = table.entry_mut(actor).and_then(|e| e.data.shapes_mut()) {
        shapes.push(Handle::from_raw_unchecked(shape));
    }
}

/// Forget `actor` on `shape`'s side of the link
pub(crate) fn unlink_shape(table: &mut ObjectTable, actor: ObjectHandle, shape: ObjectHandle) {
    if let Some(existing) = table.entry_mut(shape).and_then(|e| e.data.as_shape_mut()) {
        existing.actors.retain(|a| a.raw() != actor);
    }
}

impl Drop for Physics {
    fn drop(&mut self) {
        let live = self.table.get_mut().objects.len();
        if live > 0 {
            log::warn!("Physics dropped with {} live objects; freeing them", live);
        } else {
            log::info!("Physics shut down");
        }
    }
}

impl fmt::Debug for Physics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Physics")
            .field("objects", &self.table.read().objects.len())
            .field("tolerances", &self.desc.tolerances)
            .finish()
    }
}
