//! Concrete type identity and the type registry
//!
//! Every kernel-managed object carries exactly one [`ConcreteType`] for its
//! whole life. The hierarchy is fixed: a small set of abstract classifications
//! ([`AbstractType`]) and the instantiable leaf types hanging off them. Each
//! leaf gets a stable [`ConcreteTypeId`] and an ancestor-name table that is
//! computed once when the [`TypeRegistry`] is built and never mutated again.
//!
//! Downcasting is expressed through the [`ObjectType`] trait. Leaf types match
//! by comparing ids (O(1)); abstract targets walk the ancestor table (O(depth)).

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeRegistryError;

/// Stable identifier of an instantiable object type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcreteTypeId(pub u16);

impl fmt::Display for ConcreteTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The instantiable object kinds the kernel manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ConcreteType {
    TriangleMesh = 1,
    ConvexMesh = 2,
    HeightField = 3,
    Material = 4,
    Shape = 5,
    RigidStatic = 6,
    RigidDynamic = 7,
}

impl ConcreteType {
    pub const ALL: [ConcreteType; 7] = [
        ConcreteType::TriangleMesh,
        ConcreteType::ConvexMesh,
        ConcreteType::HeightField,
        ConcreteType::Material,
        ConcreteType::Shape,
        ConcreteType::RigidStatic,
        ConcreteType::RigidDynamic,
    ];

    #[inline]
    pub const fn id(self) -> ConcreteTypeId {
        ConcreteTypeId(self as u16)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ConcreteType::TriangleMesh => "TriangleMesh",
            ConcreteType::ConvexMesh => "ConvexMesh",
            ConcreteType::HeightField => "HeightField",
            ConcreteType::Material => "Material",
            ConcreteType::Shape => "Shape",
            ConcreteType::RigidStatic => "RigidStatic",
            ConcreteType::RigidDynamic => "RigidDynamic",
        }
    }

    /// The declared abstract parent
    pub const fn parent(self) -> AbstractType {
        match self {
            ConcreteType::TriangleMesh
            | ConcreteType::ConvexMesh
            | ConcreteType::HeightField
            | ConcreteType::Material
            | ConcreteType::Shape => AbstractType::RefCounted,
            ConcreteType::RigidStatic => AbstractType::RigidActor,
            ConcreteType::RigidDynamic => AbstractType::RigidBody,
        }
    }

    /// Whether instances carry a reference count
    pub const fn is_shareable(self) -> bool {
        matches!(self.parent(), AbstractType::RefCounted)
    }

    pub fn from_id(id: ConcreteTypeId) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-instantiable classifications in the object hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbstractType {
    Base,
    RefCounted,
    Actor,
    RigidActor,
    RigidBody,
}

impl AbstractType {
    /// Parents always precede children
    pub const ALL: [AbstractType; 5] = [
        AbstractType::Base,
        AbstractType::RefCounted,
        AbstractType::Actor,
        AbstractType::RigidActor,
        AbstractType::RigidBody,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            AbstractType::Base => "Base",
            AbstractType::RefCounted => "RefCounted",
            AbstractType::Actor => "Actor",
            AbstractType::RigidActor => "RigidActor",
            AbstractType::RigidBody => "RigidBody",
        }
    }

    pub const fn parent(self) -> Option<AbstractType> {
        match self {
            AbstractType::Base => None,
            AbstractType::RefCounted | AbstractType::Actor => Some(AbstractType::Base),
            AbstractType::RigidActor => Some(AbstractType::Actor),
            AbstractType::RigidBody => Some(AbstractType::RigidActor),
        }
    }
}

/// Registration record of one leaf type
#[derive(Clone, Debug)]
pub struct TypeInfo {
    /// Stable id
    pub id: ConcreteTypeId,
    /// Concrete type name
    pub name: &'static str,
    /// Whether instances are reference counted
    pub shareable: bool,
    /// Own name first, then each ancestor up to the root
    ancestors: Box<[&'static str]>,
}

impl TypeInfo {
    /// The concrete name followed by every declared ancestor
    pub fn ancestors(&self) -> &[&'static str] {
        &self.ancestors
    }

    /// True if `name` is this type or one of its ancestors
    #[inline]
    pub fn is_kind_of(&self, name: &str) -> bool {
        self.ancestors.iter().any(|ancestor| *ancestor == name)
    }

    /// Number of hops from this type to the root
    pub fn depth(&self) -> usize {
        self.ancestors.len() - 1
    }
}

/// Collects type declarations and validates them before the registry is frozen
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    abstract_parents: BTreeMap<&'static str, Option<&'static str>>,
    concrete: Vec<(ConcreteTypeId, &'static str, &'static str, bool)>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an abstract classification. Parents must be declared first.
    pub fn declare_abstract(
        &mut self,
        name: &'static str,
        parent: Option<&'static str>,
    ) -> Result<&mut Self, TypeRegistryError> {
        if self.name_taken(name) {
            return Err(TypeRegistryError::DuplicateName(name));
        }
        if let Some(parent) = parent {
            if !self.abstract_parents.contains_key(parent) {
                return Err(TypeRegistryError::UnknownParent { name, parent });
            }
        }
        self.abstract_parents.insert(name, parent);
        Ok(self)
    }

    /// Register an instantiable leaf type under a declared abstract parent
    pub fn register(
        &mut self,
        id: ConcreteTypeId,
        name: &'static str,
        parent: &'static str,
        shareable: bool,
    ) -> Result<&mut Self, TypeRegistryError> {
        if let Some((_, existing, _, _)) = self.concrete.iter().find(|(other, ..)| *other == id) {
            return Err(TypeRegistryError::DuplicateId {
                id,
                existing,
                name,
            });
        }
        if self.name_taken(name) {
            return Err(TypeRegistryError::DuplicateName(name));
        }
        if !self.abstract_parents.contains_key(parent) {
            return Err(TypeRegistryError::UnknownParent { name, parent });
        }
        self.concrete.push((id, name, parent, shareable));
        Ok(self)
    }

    /// Freeze the declarations, computing every ancestor table
    pub fn build(self) -> TypeRegistry {
        let mut by_id = BTreeMap::new();
        let mut by_name = BTreeMap::new();

        for (id, name, parent, shareable) in self.concrete {
            let mut ancestors = vec![name];
            let mut next = Some(parent);
            while let Some(current) = next {
                ancestors.push(current);
                next = self.abstract_parents.get(current).copied().flatten();
            }

            by_name.insert(name, id);
            by_id.insert(
                id,
                TypeInfo {
                    id,
                    name,
                    shareable,
                    ancestors: ancestors.into_boxed_slice(),
                },
            );
        }

        TypeRegistry {
            by_id,
            by_name,
            abstract_names: self.abstract_parents.into_keys().collect(),
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.abstract_parents.contains_key(name)
            || self.concrete.iter().any(|(_, existing, _, _)| *existing == name)
    }
}

/// Frozen table of every leaf type and its ancestry
pub struct TypeRegistry {
    by_id: BTreeMap<ConcreteTypeId, TypeInfo>,
    by_name: BTreeMap<&'static str, ConcreteTypeId>,
    abstract_names: BTreeSet<&'static str>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// Registry holding the kernel's fixed hierarchy
    pub fn builtin() -> Result<Self, TypeRegistryError> {
        Ok(Self::builtin_builder()?.build())
    }

    /// Builder pre-loaded with the kernel's fixed hierarchy
    pub fn builtin_builder() -> Result<TypeRegistryBuilder, TypeRegistryError> {
        let mut builder = TypeRegistryBuilder::new();
        for ty in AbstractType::ALL {
            builder.declare_abstract(ty.name(), ty.parent().map(AbstractType::name))?;
        }
        for ty in ConcreteType::ALL {
            builder.register(ty.id(), ty.name(), ty.parent().name(), ty.is_shareable())?;
        }
        Ok(builder)
    }

    /// Get type info by id
    #[inline]
    pub fn get(&self, id: ConcreteTypeId) -> Option<&TypeInfo> {
        self.by_id.get(&id)
    }

    /// Get type info by concrete name
    pub fn get_by_name(&self, name: &str) -> Option<&TypeInfo> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Concrete type name for an id, without needing an instance
    pub fn name_of(&self, id: ConcreteTypeId) -> Option<&'static str> {
        self.get(id).map(|info| info.name)
    }

    pub fn id_of(&self, name: &str) -> Option<ConcreteTypeId> {
        self.by_name.get(name).copied()
    }

    /// True if `id` names a registered type that is `name` or descends from it
    pub fn is_kind_of(&self, id: ConcreteTypeId, name: &str) -> bool {
        self.get(id).is_some_and(|info| info.is_kind_of(name))
    }

    pub fn is_shareable(&self, id: ConcreteTypeId) -> bool {
        self.get(id).is_some_and(|info| info.shareable)
    }

    pub fn is_abstract(&self, name: &str) -> bool {
        self.abstract_names.contains(name)
    }

    pub fn contains(&self, id: ConcreteTypeId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Iterate over all leaf types in id order
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_id.len())
            .field("abstract", &self.abstract_names.len())
            .finish()
    }
}

/// A type a handle can be downcast to
pub trait ObjectType: 'static {
    /// Name used for kind-of queries
    const NAME: &'static str;

    /// Whether an object of concrete type `ty` may be viewed as `Self`
    fn matches(registry: &TypeRegistry, ty: ConcreteTypeId) -> bool {
        registry.is_kind_of(ty, Self::NAME)
    }
}

/// Types whose instances carry a reference count
pub trait RefCountedKind: ObjectType {}

/// Types whose instances own shapes
pub trait ActorKind: ObjectType {}

/// Any kernel object
pub enum AnyObject {}

/// Any reference-counted resource
pub enum AnyRefCounted {}

/// Any actor
pub enum AnyActor {}

/// Any rigid actor, static or dynamic
pub enum AnyRigidActor {}

/// Any simulated rigid body
pub enum AnyRigidBody {}

impl ObjectType for AnyObject {
    const NAME: &'static str = "Base";

    fn matches(_: &TypeRegistry, _: ConcreteTypeId) -> bool {
        true
    }
}

impl ObjectType for AnyRefCounted {
    const NAME: &'static str = "RefCounted";
}

impl ObjectType for AnyActor {
    const NAME: &'static str = "Actor";
}

impl ObjectType for AnyRigidActor {
    const NAME: &'static str = "RigidActor";
}

impl ObjectType for AnyRigidBody {
    const NAME: &'static str = "RigidBody";
}

impl RefCountedKind for AnyRefCounted {}
impl ActorKind for AnyActor {}
impl ActorKind for AnyRigidActor {}
impl ActorKind for AnyRigidBody {}
