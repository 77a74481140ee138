//! Building a persisted graph from live objects
//!
//! Collection starts from a set of roots and follows every outgoing edge
//! (actor to shapes, shape to geometry resource and materials), so the graph
//! it produces is closed: reconciling it needs nothing that is not in it,
//! apart from objects explicitly bound as externals.

use std::collections::{HashMap, HashSet};

use keel_core::ObjectHandle;
use keel_physics::{ObjectData, Physics, PhysicsRead};

use crate::error::{Result, SerialError};
use crate::graph::{Payload, PersistedGraph, PersistedObject, SerialId, ShapePayload};

/// Walks live objects under one read view and records them
pub struct Collector<'v, 'p> {
    view: &'v PhysicsRead<'p>,
    ids: HashMap<ObjectHandle, SerialId>,
    externals: HashMap<ObjectHandle, SerialId>,
    reserved: HashSet<SerialId>,
    pending: Vec<ObjectHandle>,
    next_id: u64,
    graph: PersistedGraph,
}

impl<'v, 'p> Collector<'v, 'p> {
    pub fn new(view: &'v PhysicsRead<'p>) -> Self {
        Self {
            view,
            ids: HashMap::new(),
            externals: HashMap::new(),
            reserved: HashSet::new(),
            pending: Vec::new(),
            next_id: 1,
            graph: PersistedGraph::new(),
        }
    }

    /// Leave `handle` out of the graph and refer to it as `id`
    ///
    /// Must be called before any root that reaches `handle` is added.
    pub fn bind_external(&mut self, handle: impl Into<ObjectHandle>, id: SerialId) -> Result<()> {
        let handle: ObjectHandle = handle.into();
        let shareable = self
            .view
            .concrete_type(handle)
            .is_some_and(|ty| ty.is_shareable());
        if !shareable {
            return Err(SerialError::InvalidExternal { id, handle });
        }
        if self.ids.contains_key(&handle) || self.reserved.contains(&id) {
            return Err(SerialError::ExternalConflict(id));
        }
        if self.ids.values().any(|assigned| *assigned == id) {
            return Err(SerialError::ExternalConflict(id));
        }

        self.externals.insert(handle, id);
        self.reserved.insert(id);
        Ok(())
    }

    /// Record `handle` and everything it references
    pub fn add_root(&mut self, handle: impl Into<ObjectHandle>) -> Result<SerialId> {
        let id = self.intern(handle.into())?;
        while let Some(next) = self.pending.pop() {
            self.emit(next)?;
        }
        Ok(id)
    }

    /// The id assigned to a collected or external object
    pub fn id_of(&self, handle: impl Into<ObjectHandle>) -> Option<SerialId> {
        let handle: ObjectHandle = handle.into();
        self.ids
            .get(&handle)
            .or_else(|| self.externals.get(&handle))
            .copied()
    }

    pub fn finish(self) -> PersistedGraph {
        log::debug!(
            "Collected {} objects and {} edges ({} externals)",
            self.graph.objects.len(),
            self.graph.edges.len(),
            self.externals.len()
        );
        self.graph
    }

    fn intern(&mut self, handle: ObjectHandle) -> Result<SerialId> {
        if let Some(id) = self.id_of(handle) {
            return Ok(id);
        }
        if !self.view.is_alive(handle) {
            return Err(SerialError::NotAlive(handle));
        }

        while self.reserved.contains(&SerialId(self.next_id)) {
            self.next_id += 1;
        }
        let id = SerialId(self.next_id);
        self.next_id += 1;

        self.ids.insert(handle, id);
        self.pending.push(handle);
        Ok(id)
    }

    fn emit(&mut self, handle: ObjectHandle) -> Result<()> {
        let view = self.view;
        let object = view.get(handle).ok_or(SerialError::NotAlive(handle))?;

        let (payload, targets): (Payload, Vec<ObjectHandle>) = match object.data() {
            ObjectData::TriangleMesh(mesh) => (Payload::TriangleMesh(mesh.to_desc()), Vec::new()),
            ObjectData::ConvexMesh(mesh) => (Payload::ConvexMesh(mesh.to_desc()), Vec::new()),
            ObjectData::HeightField(field) => (Payload::HeightField(field.to_desc()), Vec::new()),
            ObjectData::Material(material) => (Payload::Material(material.to_desc()), Vec::new()),
            ObjectData::Shape(shape) => {
                let targets = shape
                    .geometry()
                    .resource()
                    .into_iter()
                    .chain(shape.materials().iter().map(|material| material.raw()))
                    .collect();
                (Payload::Shape(ShapePayload::from_shape(shape)), targets)
            }
            ObjectData::RigidStatic(actor) => (
                Payload::RigidStatic(actor.to_desc()),
                actor.shapes().iter().map(|shape| shape.raw()).collect(),
            ),
            ObjectData::RigidDynamic(actor) => (
                Payload::RigidDynamic(actor.to_desc()),
                actor.shapes().iter().map(|shape| shape.raw()).collect(),
            ),
        };

        let owner = self.ids[&handle];
        let mut persisted = PersistedObject::new(owner, payload);
        persisted.name = object.name().map(str::to_owned);
        self.graph.push_object(persisted);

        for target in targets {
            let target = self.intern(target)?;
            self.graph.push_edge(owner, target);
        }
        Ok(())
    }
}

/// Collect `roots` and their dependencies into a new graph
pub fn collect(physics: &Physics, roots: &[ObjectHandle]) -> Result<PersistedGraph> {
    let view = physics.read();
    let mut collector = Collector::new(&view);
    for root in roots {
        collector.add_root(*root)?;
    }
    Ok(collector.finish())
}
