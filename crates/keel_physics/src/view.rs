//! Read-only traversal of the object graph
//!
//! A [`PhysicsRead`] holds the shared side of the object table lock. Any
//! number of them may exist at once and they can be shared across scoped
//! threads; lifetime mutations block until every one is dropped.

use std::any::Any;

use keel_core::{ConcreteType, Handle, ObjectHandle, ObjectType};
use parking_lot::RwLockReadGuard;

use crate::geometry::Geometry;
use crate::material::Material;
use crate::object::{Concrete, ObjectRef};
use crate::physics::{ObjectTable, Physics};
use crate::shape::Shape;

/// Shared traversal guard returned by [`Physics::read`]
pub struct PhysicsRead<'a> {
    physics: &'a Physics,
    table: RwLockReadGuard<'a, ObjectTable>,
}

impl<'a> PhysicsRead<'a> {
    pub(crate) fn new(physics: &'a Physics, table: RwLockReadGuard<'a, ObjectTable>) -> Self {
        Self { physics, table }
    }

    /// Borrow a live object
    pub fn get(&self, handle: impl Into<ObjectHandle>) -> Option<ObjectRef<'_>> {
        let handle = handle.into();
        let entry = self.table.entry(handle)?;
        Some(ObjectRef::new(handle, entry, self.physics.registry()))
    }

    /// Borrow a live object's payload through its typed handle
    pub fn get_as<T: Concrete>(&self, handle: Handle<T>) -> Option<&T> {
        T::from_data(&self.table.entry(handle.raw())?.data)
    }

    pub fn is_alive(&self, handle: impl Into<ObjectHandle>) -> bool {
        self.table.objects.contains(handle.into())
    }

    pub fn reference_count(&self, handle: impl Into<ObjectHandle>) -> Option<u32> {
        self.get(handle)?.reference_count()
    }

    pub fn concrete_type(&self, handle: impl Into<ObjectHandle>) -> Option<ConcreteType> {
        Some(self.get(handle)?.concrete_type())
    }

    pub fn is_kind_of(&self, handle: impl Into<ObjectHandle>, name: &str) -> bool {
        self.get(handle).is_some_and(|object| object.is_kind_of(name))
    }

    pub fn downcast<T: ObjectType>(&self, handle: impl Into<ObjectHandle>) -> Option<Handle<T>> {
        self.get(handle)?.downcast::<T>()
    }

    /// Host data attached to the object, if it is a `T`
    pub fn user_data<T: Any>(&self, handle: impl Into<ObjectHandle>) -> Option<&T> {
        let handle: ObjectHandle = handle.into();
        self.table.user_data.get(&handle)?.downcast_ref::<T>()
    }

    /// Every live object in slot order
    pub fn objects(&self) -> impl Iterator<Item = ObjectRef<'_>> + '_ {
        let registry = self.physics.registry();
        self.table
            .objects
            .iter()
            .map(move |(handle, boxed)| ObjectRef::new(handle, boxed, registry))
    }

    /// Handles to every live object that is a `T`
    pub fn objects_of<T: ObjectType>(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.objects().filter_map(|object| object.downcast::<T>())
    }

    pub fn count_of(&self, ty: ConcreteType) -> usize {
        self.objects()
            .filter(|object| object.concrete_type() == ty)
            .count()
    }

    pub fn len(&self) -> usize {
        self.table.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.objects.is_empty()
    }

    /// Shapes attached to an actor, empty for anything else
    pub fn shapes_of(&self, actor: impl Into<ObjectHandle>) -> &[Handle<Shape>] {
        self.get(actor).map(|object| object.shapes()).unwrap_or(&[])
    }

    /// Geometry of a live shape
    pub fn geometry_of(&self, shape: Handle<Shape>) -> Option<&Geometry> {
        Some(self.get_as(shape)?.geometry())
    }

    /// Materials of a live shape, empty if it is gone
    pub fn materials_of(&self, shape: Handle<Shape>) -> &[Handle<Material>] {
        self.get_as(shape).map(Shape::materials).unwrap_or(&[])
    }
}
