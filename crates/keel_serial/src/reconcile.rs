//! Reconstructing a persisted graph with reconciled reference counts
//!
//! Reconciliation runs in two passes. The first pass reads the whole graph
//! without touching the object table: it checks every id, type and edge and
//! tallies the incoming edges of each object. The second pass inserts the
//! objects in dependency order (resources, then shapes, then actors) through
//! a single [`LoadBatch`](keel_physics::LoadBatch), giving each shareable
//! object a count of one plus its tally. Edges are never replayed one by one,
//! and a failure in either pass leaves the object table as it was.

use std::collections::{BTreeMap, HashMap, HashSet};

use keel_core::{
    AnyRefCounted, ConcreteType, Handle, ObjectHandle, ObjectType, Severity, SourceLocation,
};
use keel_physics::{
    ConvexMesh, EdgeKind, Geometry, HeightField, LoadBatch, Material, Physics, Shape, ShapeDesc,
    TriangleMesh,
};

use crate::error::{Result, SerialError};
use crate::graph::{GeometryParams, Payload, PersistedGraph, PersistedObject, SerialId};

/// Handles of reconstructed objects, keyed by persisted id
///
/// The caller owns one reference to every shareable object in here and must
/// eventually release it, exactly as if it had created the object itself.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    handles: BTreeMap<SerialId, ObjectHandle>,
}

impl Reconciled {
    pub fn handle(&self, id: SerialId) -> Option<ObjectHandle> {
        self.handles.get(&id).copied()
    }

    /// Typed handle if the object is a `T`
    pub fn get<T: ObjectType>(&self, physics: &Physics, id: SerialId) -> Option<Handle<T>> {
        physics.downcast(self.handle(id)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SerialId, ObjectHandle)> + '_ {
        self.handles.iter().map(|(id, handle)| (*id, *handle))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Reconstructs graphs into one [`Physics`]
pub struct Reconciler<'p> {
    physics: &'p Physics,
    externals: HashMap<SerialId, ObjectHandle>,
}

impl<'p> Reconciler<'p> {
    pub fn new(physics: &'p Physics) -> Self {
        Self {
            physics,
            externals: HashMap::new(),
        }
    }

    /// Resolve edges targeting `id` to an object that is already live
    pub fn bind_external(&mut self, id: SerialId, handle: impl Into<ObjectHandle>) -> &mut Self {
        self.externals.insert(id, handle.into());
        self
    }

    /// Validate `graph`, then build it in one batch
    #[track_caller]
    pub fn reconcile(&self, graph: &PersistedGraph) -> Result<Reconciled> {
        let location = SourceLocation::caller();
        let plan = Plan::build(self.physics, graph, &self.externals)
            .map_err(|error| self.reject(error, location))?;

        let handles = self.physics.load(|batch| plan.construct(batch))?;

        log::info!(
            "Reconciled {} objects and {} edges ({} external references)",
            handles.len(),
            graph.edges.len(),
            plan.external_tally()
        );
        Ok(Reconciled { handles })
    }

    /// Report a validation failure on the diagnostic channel
    fn reject(&self, error: SerialError, location: SourceLocation) -> SerialError {
        self.physics.foundation().diagnostics().report(
            Severity::InvalidParameter,
            &error.to_string(),
            location,
        );
        error
    }
}

/// Reconcile `graph` into `physics` with no external bindings
#[track_caller]
pub fn reconcile(physics: &Physics, graph: &PersistedGraph) -> Result<Reconciled> {
    Reconciler::new(physics).reconcile(graph)
}

/// Everything the first pass learned about a graph
struct Plan<'g> {
    /// Objects in construction order
    order: Vec<&'g PersistedObject>,
    types: HashMap<SerialId, ConcreteType>,
    externals: HashMap<SerialId, ObjectHandle>,
    tally: HashMap<SerialId, u32>,
    geometry: HashMap<SerialId, SerialId>,
    materials: HashMap<SerialId, Vec<SerialId>>,
    shapes: HashMap<SerialId, Vec<SerialId>>,
}

impl<'g> Plan<'g> {
    fn build(
        physics: &Physics,
        graph: &'g PersistedGraph,
        externals: &HashMap<SerialId, ObjectHandle>,
    ) -> Result<Self> {
        let mut plan = Plan {
            order: Vec::with_capacity(graph.objects.len()),
            types: HashMap::with_capacity(graph.objects.len() + externals.len()),
            externals: externals.clone(),
            tally: HashMap::new(),
            geometry: HashMap::new(),
            materials: HashMap::new(),
            shapes: HashMap::new(),
        };

        plan.check_objects(physics, graph)?;
        plan.check_externals(physics)?;
        plan.check_edges(graph)?;
        plan.check_shapes()?;
        Ok(plan)
    }

    fn check_objects(&mut self, physics: &Physics, graph: &'g PersistedGraph) -> Result<()> {
        let registry = physics.registry();
        for object in &graph.objects {
            if self.externals.contains_key(&object.id) {
                return Err(SerialError::ExternalConflict(object.id));
            }

            let declared = registry
                .contains(object.type_id)
                .then(|| ConcreteType::from_id(object.type_id))
                .flatten()
                .ok_or(SerialError::UnknownType {
                    id: object.id,
                    type_id: object.type_id,
                })?;
            let payload = object.payload.concrete_type();
            if payload != declared {
                return Err(SerialError::PayloadMismatch {
                    id: object.id,
                    declared: declared.name(),
                    payload: payload.name(),
                });
            }

            if self.types.insert(object.id, declared).is_some() {
                return Err(SerialError::DuplicateId(object.id));
            }
        }

        self.order = graph.objects.iter().collect();
        self.order.sort_by_key(|object| phase(object.payload.concrete_type()));
        Ok(())
    }

    fn check_externals(&mut self, physics: &Physics) -> Result<()> {
        for (id, handle) in &self.externals {
            match physics.concrete_type(*handle) {
                Some(ty) if ty.is_shareable() => {
                    self.types.insert(*id, ty);
                }
                _ => {
                    return Err(SerialError::InvalidExternal {
                        id: *id,
                        handle: *handle,
                    })
                }
            }
        }
        Ok(())
    }

    fn check_edges(&mut self, graph: &PersistedGraph) -> Result<()> {
        let mut owners: HashMap<SerialId, usize> = HashMap::new();
        let mut attached: HashSet<(SerialId, SerialId)> = HashSet::new();

        for edge in &graph.edges {
            let dangling = |missing| SerialError::DanglingEdge {
                owner: edge.owner,
                target: edge.target,
                missing,
            };
            // Externals are already counted in the live table and cannot own
            let owner_type = match self.types.get(&edge.owner) {
                Some(ty) if !self.externals.contains_key(&edge.owner) => *ty,
                _ => return Err(dangling(edge.owner)),
            };
            let target_type = *self.types.get(&edge.target).ok_or_else(|| dangling(edge.target))?;

            let kind = EdgeKind::between(owner_type, target_type).ok_or(SerialError::IllegalEdge {
                owner: edge.owner,
                target: edge.target,
                owner_type: owner_type.name(),
                target_type: target_type.name(),
            })?;

            match kind {
                EdgeKind::ActorShape => {
                    if !attached.insert((edge.owner, edge.target)) {
                        return Err(SerialError::DuplicateEdge {
                            owner: edge.owner,
                            target: edge.target,
                        });
                    }
                    *owners.entry(edge.target).or_default() += 1;
                    self.shapes.entry(edge.owner).or_default().push(edge.target);
                }
                EdgeKind::ShapeGeometry => {
                    if self.geometry.insert(edge.owner, edge.target).is_some() {
                        return Err(SerialError::GeometryEdge {
                            shape: edge.owner,
                            detail: "more than one geometry edge".into(),
                        });
                    }
                }
                EdgeKind::ShapeMaterial => {
                    self.materials.entry(edge.owner).or_default().push(edge.target);
                }
            }
            *self.tally.entry(edge.target).or_default() += 1;
        }

        for object in &self.order {
            if let Payload::Shape(shape) = &object.payload {
                let count = owners.get(&object.id).copied().unwrap_or(0);
                if shape.exclusive && count > 1 {
                    return Err(SerialError::SharedExclusiveShape {
                        shape: object.id,
                        owners: count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Each shape's geometry edge must match its geometry parameters
    fn check_shapes(&self) -> Result<()> {
        for object in &self.order {
            let Payload::Shape(shape) = &object.payload else {
                continue;
            };
            let target = self
                .geometry
                .get(&object.id)
                .and_then(|id| self.types.get(id));

            match (shape.geometry.resource_type(), target) {
                (Some(expected), Some(found)) if expected == *found => {}
                (Some(expected), found) => {
                    return Err(SerialError::GeometryEdge {
                        shape: object.id,
                        detail: match found {
                            Some(found) => format!("{expected} geometry cannot use a {found}"),
                            None => format!("{expected} geometry needs exactly one geometry edge"),
                        },
                    })
                }
                (None, Some(found)) => {
                    return Err(SerialError::GeometryEdge {
                        shape: object.id,
                        detail: format!(
                            "{:?} geometry cannot reference a {found}",
                            shape.geometry.kind()
                        ),
                    })
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    /// Second pass: insert everything with its final count
    fn construct(&self, batch: &mut LoadBatch<'_>) -> Result<BTreeMap<SerialId, ObjectHandle>> {
        let mut handles = BTreeMap::new();

        for object in &self.order {
            let count = 1 + self.tally.get(&object.id).copied().unwrap_or(0);
            let name = object.name.as_deref();
            let handle = match &object.payload {
                Payload::TriangleMesh(desc) => batch.insert_triangle_mesh(desc, name, count)?.raw(),
                Payload::ConvexMesh(desc) => batch.insert_convex_mesh(desc, name, count)?.raw(),
                Payload::HeightField(desc) => batch.insert_height_field(desc, name, count)?.raw(),
                Payload::Material(desc) => batch.insert_material(desc, name, count)?.raw(),
                Payload::Shape(shape) => {
                    let resource = self
                        .geometry
                        .get(&object.id)
                        .map(|id| self.resolve(&handles, object.id, *id))
                        .transpose()?;
                    let materials = self
                        .materials
                        .get(&object.id)
                        .into_iter()
                        .flatten()
                        .map(|id| self.resolve(&handles, object.id, *id))
                        .map(|handle| handle.map(Handle::<Material>::from_raw_unchecked))
                        .collect::<Result<Vec<_>>>()?;

                    let mut desc = ShapeDesc::new(geometry(object.id, shape.geometry, resource)?)
                        .with_materials(&materials)
                        .with_local_pose(shape.local_pose)
                        .with_contact_offset(shape.contact_offset)
                        .with_rest_offset(shape.rest_offset);
                    desc.exclusive = shape.exclusive;
                    batch.insert_shape(&desc, name, count)?.raw()
                }
                Payload::RigidStatic(desc) => {
                    let shapes = self.shapes_of(&handles, object.id)?;
                    batch.insert_rigid_static(desc, &shapes, name)?.raw()
                }
                Payload::RigidDynamic(desc) => {
                    let shapes = self.shapes_of(&handles, object.id)?;
                    batch.insert_rigid_dynamic(desc, &shapes, name)?.raw()
                }
            };
            handles.insert(object.id, handle);
        }

        for (id, handle) in &self.externals {
            if let Some(tally) = self.tally.get(id) {
                batch.add_references(Handle::<AnyRefCounted>::from_raw_unchecked(*handle), *tally)?;
            }
        }
        Ok(handles)
    }

    /// Handle for the target of a validated edge
    ///
    /// Targets are built in an earlier phase than their owners, so a miss
    /// here means the plan is inconsistent with the graph it came from.
    fn resolve(
        &self,
        handles: &BTreeMap<SerialId, ObjectHandle>,
        owner: SerialId,
        target: SerialId,
    ) -> Result<ObjectHandle> {
        let resolved = handles.get(&target).or_else(|| self.externals.get(&target));
        resolved.copied().ok_or(SerialError::DanglingEdge {
            owner,
            target,
            missing: target,
        })
    }

    fn shapes_of(
        &self,
        handles: &BTreeMap<SerialId, ObjectHandle>,
        actor: SerialId,
    ) -> Result<Vec<Handle<Shape>>> {
        self.shapes
            .get(&actor)
            .into_iter()
            .flatten()
            .map(|id| self.resolve(handles, actor, *id).map(Handle::from_raw_unchecked))
            .collect()
    }

    fn external_tally(&self) -> u64 {
        self.externals
            .keys()
            .filter_map(|id| self.tally.get(id))
            .map(|n| u64::from(*n))
            .sum()
    }
}

/// Construction phase: targets are always built before their owners
fn phase(ty: ConcreteType) -> u8 {
    match ty {
        ConcreteType::TriangleMesh
        | ConcreteType::ConvexMesh
        | ConcreteType::HeightField
        | ConcreteType::Material => 0,
        ConcreteType::Shape => 1,
        ConcreteType::RigidStatic | ConcreteType::RigidDynamic => 2,
    }
}

/// Reattach a resource to stripped geometry parameters
fn geometry(
    shape: SerialId,
    params: GeometryParams,
    resource: Option<ObjectHandle>,
) -> Result<Geometry> {
    let geometry = match (params, resource) {
        (GeometryParams::Sphere { radius }, None) => Geometry::Sphere { radius },
        (GeometryParams::Box { half_extents }, None) => Geometry::Box { half_extents },
        (
            GeometryParams::Capsule {
                radius,
                half_height,
            },
            None,
        ) => Geometry::Capsule {
            radius,
            half_height,
        },
        (GeometryParams::Plane, None) => Geometry::Plane,
        (GeometryParams::TriangleMesh { scale }, Some(mesh)) => Geometry::TriangleMesh {
            mesh: Handle::<TriangleMesh>::from_raw_unchecked(mesh),
            scale,
        },
        (GeometryParams::ConvexMesh { scale }, Some(mesh)) => Geometry::ConvexMesh {
            mesh: Handle::<ConvexMesh>::from_raw_unchecked(mesh),
            scale,
        },
        (
            GeometryParams::HeightField {
                height_scale,
                row_scale,
                column_scale,
            },
            Some(field),
        ) => Geometry::HeightField {
            field: Handle::<HeightField>::from_raw_unchecked(field),
            height_scale,
            row_scale,
            column_scale,
        },
        (params, _) => {
            return Err(SerialError::GeometryEdge {
                shape,
                detail: format!("{:?} geometry does not match its edges", params.kind()),
            })
        }
    };
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_put_targets_first() {
        for ty in ConcreteType::ALL {
            for target in ConcreteType::ALL {
                if EdgeKind::between(ty, target).is_some() {
                    assert!(phase(target) < phase(ty), "{ty} -> {target}");
                }
            }
        }
    }

    fn empty_plan() -> Plan<'static> {
        Plan {
            order: Vec::new(),
            types: HashMap::new(),
            externals: HashMap::new(),
            tally: HashMap::new(),
            geometry: HashMap::new(),
            materials: HashMap::new(),
            shapes: HashMap::new(),
        }
    }

    #[test]
    fn test_unbuilt_target_does_not_resolve() {
        let mut plan = empty_plan();
        let mut handles = BTreeMap::new();
        handles.insert(SerialId(1), ObjectHandle::new(0, 0));
        plan.externals.insert(SerialId(2), ObjectHandle::new(5, 3));
        plan.shapes.insert(SerialId(9), vec![SerialId(1), SerialId(3)]);

        assert_eq!(plan.resolve(&handles, SerialId(9), SerialId(1)).unwrap(), ObjectHandle::new(0, 0));
        assert_eq!(plan.resolve(&handles, SerialId(9), SerialId(2)).unwrap(), ObjectHandle::new(5, 3));
        assert!(matches!(
            plan.resolve(&handles, SerialId(9), SerialId(3)),
            Err(SerialError::DanglingEdge { missing: SerialId(3), .. })
        ));
        assert!(matches!(
            plan.shapes_of(&handles, SerialId(9)),
            Err(SerialError::DanglingEdge { owner: SerialId(9), .. })
        ));
    }

    #[test]
    fn test_geometry_requires_matching_resource() {
        let id = SerialId(1);
        let sphere = geometry(id, GeometryParams::Sphere { radius: 1.0 }, None).unwrap();
        assert_eq!(sphere, Geometry::sphere(1.0));

        let mesh = GeometryParams::TriangleMesh { scale: [1.0; 3] };
        assert!(matches!(
            geometry(id, mesh, None),
            Err(SerialError::GeometryEdge { .. })
        ));
        assert!(matches!(
            geometry(id, GeometryParams::Plane, Some(ObjectHandle::default())),
            Err(SerialError::GeometryEdge { .. })
        ));
    }
}
