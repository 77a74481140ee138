//! Object records and typed access to their payloads
//!
//! Every live object is one [`ObjectEntry`] in the physics object table. The
//! entry's payload is an [`ObjectData`] variant fixed at creation, which is
//! also what gives the object its concrete type.

use keel_core::{
    ActorKind, ConcreteType, ConcreteTypeId, Handle, ObjectHandle, ObjectType, RefCountedKind,
    TypeRegistry,
};

use crate::actor::{RigidDynamic, RigidStatic};
use crate::material::Material;
use crate::resource::{ConvexMesh, HeightField, TriangleMesh};
use crate::shape::Shape;

/// A leaf object type with a payload in [`ObjectData`]
pub trait Concrete: ObjectType + Sized {
    const TYPE: ConcreteType;

    /// Borrow the payload if `data` is this type
    fn from_data(data: &ObjectData) -> Option<&Self>;
}

macro_rules! impl_concrete {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ObjectType for $ty {
                const NAME: &'static str = ConcreteType::$ty.name();

                #[inline]
                fn matches(_: &TypeRegistry, ty: ConcreteTypeId) -> bool {
                    ty == ConcreteType::$ty.id()
                }
            }

            impl Concrete for $ty {
                const TYPE: ConcreteType = ConcreteType::$ty;

                #[inline]
                fn from_data(data: &ObjectData) -> Option<&Self> {
                    match data {
                        ObjectData::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_concrete!(
    TriangleMesh,
    ConvexMesh,
    HeightField,
    Material,
    Shape,
    RigidStatic,
    RigidDynamic,
);

impl RefCountedKind for TriangleMesh {}
impl RefCountedKind for ConvexMesh {}
impl RefCountedKind for HeightField {}
impl RefCountedKind for Material {}
impl RefCountedKind for Shape {}

impl ActorKind for RigidStatic {}
impl ActorKind for RigidDynamic {}

/// The counted relations the object graph allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    ActorShape,
    ShapeGeometry,
    ShapeMaterial,
}

impl EdgeKind {
    /// Classify an owner/target pair, `None` if no edge may join them
    pub fn between(owner: ConcreteType, target: ConcreteType) -> Option<EdgeKind> {
        use ConcreteType as T;

        match (owner, target) {
            (T::RigidStatic | T::RigidDynamic, T::Shape) => Some(EdgeKind::ActorShape),
            (T::Shape, T::TriangleMesh | T::ConvexMesh | T::HeightField) => {
                Some(EdgeKind::ShapeGeometry)
            }
            (T::Shape, T::Material) => Some(EdgeKind::ShapeMaterial),
            _ => None,
        }
    }
}

/// Payload of a live object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    TriangleMesh(TriangleMesh),
    ConvexMesh(ConvexMesh),
    HeightField(HeightField),
    Material(Material),
    Shape(Shape),
    RigidStatic(RigidStatic),
    RigidDynamic(RigidDynamic),
}

impl ObjectData {
    pub fn concrete_type(&self) -> ConcreteType {
        match self {
            ObjectData::TriangleMesh(_) => ConcreteType::TriangleMesh,
            ObjectData::ConvexMesh(_) => ConcreteType::ConvexMesh,
            ObjectData::HeightField(_) => ConcreteType::HeightField,
            ObjectData::Material(_) => ConcreteType::Material,
            ObjectData::Shape(_) => ConcreteType::Shape,
            ObjectData::RigidStatic(_) => ConcreteType::RigidStatic,
            ObjectData::RigidDynamic(_) => ConcreteType::RigidDynamic,
        }
    }

    /// Shapes attached to an actor, `None` for non-actors
    pub fn shapes(&self) -> Option<&[Handle<Shape>]> {
        match self {
            ObjectData::RigidStatic(actor) => Some(&actor.shapes),
            ObjectData::RigidDynamic(actor) => Some(&actor.shapes),
            _ => None,
        }
    }

    pub(crate) fn shapes_mut(&mut self) -> Option<&mut Vec<Handle<Shape>>> {
        match self {
            ObjectData::RigidStatic(actor) => Some(&mut actor.shapes),
            ObjectData::RigidDynamic(actor) => Some(&mut actor.shapes),
            _ => None,
        }
    }

    pub fn as_shape(&self) -> Option<&Shape> {
        match self {
            ObjectData::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    pub(crate) fn as_shape_mut(&mut self) -> Option<&mut Shape> {
        match self {
            ObjectData::Shape(shape) => Some(shape),
            _ => None,
        }
    }
}

/// One slot of the object table
#[derive(Debug)]
pub(crate) struct ObjectEntry {
    pub(crate) name: Option<Box<str>>,
    /// Meaningful only for shareable types
    pub(crate) ref_count: u32,
    pub(crate) data: ObjectData,
}

impl ObjectEntry {
    pub(crate) fn new(data: ObjectData, name: Option<&str>, ref_count: u32) -> Self {
        Self {
            name: name.map(Into::into),
            ref_count,
            data,
        }
    }

    #[inline]
    pub(crate) fn concrete_type(&self) -> ConcreteType {
        self.data.concrete_type()
    }
}

/// Borrowed view of a live object
#[derive(Clone, Copy)]
pub struct ObjectRef<'a> {
    handle: ObjectHandle,
    entry: &'a ObjectEntry,
    registry: &'a TypeRegistry,
}

impl<'a> ObjectRef<'a> {
    pub(crate) fn new(handle: ObjectHandle, entry: &'a ObjectEntry, registry: &'a TypeRegistry) -> Self {
        Self {
            handle,
            entry,
            registry,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn concrete_type(&self) -> ConcreteType {
        self.entry.concrete_type()
    }

    pub fn concrete_type_name(&self) -> &'static str {
        self.concrete_type().name()
    }

    pub fn is_kind_of(&self, name: &str) -> bool {
        self.registry.is_kind_of(self.concrete_type().id(), name)
    }

    pub fn name(&self) -> Option<&'a str> {
        self.entry.name.as_deref()
    }

    /// Current count, `None` for types that are not reference counted
    pub fn reference_count(&self) -> Option<u32> {
        self.concrete_type()
            .is_shareable()
            .then_some(self.entry.ref_count)
    }

    pub fn data(&self) -> &'a ObjectData {
        &self.entry.data
    }

    /// Borrow the payload as a concrete type
    pub fn downcast_ref<T: Concrete>(&self) -> Option<&'a T> {
        T::from_data(&self.entry.data)
    }

    /// Typed handle to the same object, if it is a `T`
    pub fn downcast<T: ObjectType>(&self) -> Option<Handle<T>> {
        T::matches(self.registry, self.concrete_type().id())
            .then(|| Handle::from_raw_unchecked(self.handle))
    }

    /// Attached shapes if this is an actor, empty otherwise
    pub fn shapes(&self) -> &'a [Handle<Shape>] {
        self.entry.data.shapes().unwrap_or(&[])
    }
}

impl std::fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("handle", &self.handle)
            .field("type", &self.concrete_type())
            .field("name", &self.name())
            .finish()
    }
}
