//! Reconciler tests against a live physics instance

use keel_core::{ConcreteTypeId, ObjectHandle, Severity};
use keel_physics::prelude::*;
use keel_physics::testing::test_physics;
use keel_serial::{
    collect, reconcile, Collector, GeometryParams, Payload, PersistedGraph, PersistedObject,
    Reconciler, SerialError, SerialId, ShapePayload,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quad_mesh() -> TriangleMeshDesc {
    TriangleMeshDesc::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}

fn shape_payload(geometry: GeometryParams) -> Payload {
    Payload::Shape(ShapePayload {
        geometry,
        exclusive: true,
        local_pose: Pose::IDENTITY,
        contact_offset: 0.02,
        rest_offset: 0.0,
    })
}

fn mesh_shape() -> Payload {
    shape_payload(GeometryParams::TriangleMesh { scale: [1.0; 3] })
}

/// Mesh #1, material #2, shapes #3 and #4 on the mesh, actor #5 owning #3
fn scene() -> PersistedGraph {
    let mut graph = PersistedGraph::new();
    let mesh = graph.push_object(
        PersistedObject::new(SerialId(1), Payload::TriangleMesh(quad_mesh())).with_name("floor"),
    );
    let material = graph.push_object(PersistedObject::new(
        SerialId(2),
        Payload::Material(MaterialDesc::wood()),
    ));
    let first = graph.push_object(PersistedObject::new(SerialId(3), mesh_shape()));
    let second = graph.push_object(PersistedObject::new(SerialId(4), mesh_shape()));
    let actor = graph.push_object(PersistedObject::new(
        SerialId(5),
        Payload::RigidStatic(RigidStaticDesc::default()),
    ));
    graph.push_edge(first, mesh);
    graph.push_edge(first, material);
    graph.push_edge(second, mesh);
    graph.push_edge(actor, first);
    graph
}

#[test]
fn test_shared_resource_round_trip() {
    init_logging();
    let physics = test_physics();

    let mesh = physics.create_triangle_mesh(&quad_mesh()).unwrap();
    let shapes: Vec<_> = (0..3)
        .map(|_| {
            physics
                .create_shape(&ShapeDesc::new(Geometry::triangle_mesh(mesh)))
                .unwrap()
        })
        .collect();
    let roots: Vec<ObjectHandle> = shapes.iter().map(|shape| shape.raw()).collect();
    let bytes = collect(&physics, &roots).unwrap().to_bytes().unwrap();

    for shape in &shapes {
        physics.release(*shape).unwrap();
    }
    physics.release(mesh).unwrap();
    assert_eq!(physics.object_count(), 0);
    physics.deletions.clear();

    let graph = PersistedGraph::from_bytes(&bytes).unwrap();
    assert_eq!(graph.len(), 4);
    let restored = reconcile(&physics, &graph).unwrap();

    let mesh_id = graph
        .objects
        .iter()
        .find(|object| matches!(object.payload, Payload::TriangleMesh(_)))
        .map(|object| object.id)
        .unwrap();
    let mesh = restored.get::<TriangleMesh>(&physics, mesh_id).unwrap();
    assert_eq!(physics.reference_count(mesh), Some(4));

    let shapes: Vec<_> = restored
        .iter()
        .filter_map(|(_, handle)| physics.downcast::<Shape>(handle))
        .collect();
    assert_eq!(shapes.len(), 3);
    for shape in shapes {
        assert_eq!(physics.reference_count(shape), Some(1));
        physics.release(shape).unwrap();
    }
    assert_eq!(physics.reference_count(mesh), Some(1));
    assert_eq!(physics.deletions.destroyed(mesh), 0);

    physics.release(mesh).unwrap();
    assert_eq!(physics.deletions.destroyed(mesh), 1);
    assert_eq!(physics.object_count(), 0);
    assert!(physics.errors.is_empty());
}

#[test]
fn test_counts_are_one_plus_incoming_edges() {
    let physics = test_physics();
    let graph = scene();

    let restored = reconcile(&physics, &graph).unwrap();
    assert_eq!(restored.len(), 5);

    let count = |id| physics.reference_count(restored.handle(SerialId(id)).unwrap());
    assert_eq!(count(1), Some(3));
    assert_eq!(count(2), Some(2));
    assert_eq!(count(3), Some(2));
    assert_eq!(count(4), Some(1));
    assert_eq!(count(5), None);

    let mesh = restored.get::<TriangleMesh>(&physics, SerialId(1)).unwrap();
    let actor = restored.get::<RigidStatic>(&physics, SerialId(5)).unwrap();
    let first = restored.get::<Shape>(&physics, SerialId(3)).unwrap();
    assert_eq!(physics.name(mesh).as_deref(), Some("floor"));
    assert_eq!(physics.read().shapes_of(actor), &[first]);

    // Give up every creator reference; only the actor keeps things alive
    for id in 1..=4 {
        let handle = restored.get::<keel_core::AnyRefCounted>(&physics, SerialId(id)).unwrap();
        physics.release(handle).unwrap();
    }
    assert_eq!(physics.object_count(), 4);

    physics.release(actor).unwrap();
    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.tracker.live_count(), 0);
}

#[test]
fn test_material_order_follows_edges() {
    let physics = test_physics();

    let mut graph = PersistedGraph::new();
    let ice = graph.push_object(PersistedObject::new(SerialId(1), Payload::Material(MaterialDesc::ice())));
    let steel =
        graph.push_object(PersistedObject::new(SerialId(2), Payload::Material(MaterialDesc::steel())));
    let shape = graph.push_object(PersistedObject::new(
        SerialId(3),
        shape_payload(GeometryParams::Sphere { radius: 0.5 }),
    ));
    graph.push_edge(shape, steel);
    graph.push_edge(shape, ice);
    graph.push_edge(shape, steel);

    let restored = reconcile(&physics, &graph).unwrap();
    let shape = restored.get::<Shape>(&physics, shape).unwrap();
    let ice = restored.get::<Material>(&physics, ice).unwrap();
    let steel = restored.get::<Material>(&physics, steel).unwrap();

    assert_eq!(physics.read().materials_of(shape), &[steel, ice, steel]);
    assert_eq!(physics.reference_count(steel), Some(3));
    assert_eq!(physics.reference_count(ice), Some(2));
}

#[test]
fn test_external_references() {
    let physics = test_physics();

    let shared = physics.create_material(&MaterialDesc::rubber()).unwrap();
    let mut graph = PersistedGraph::new();
    let external = SerialId(100);
    let shape = graph.push_object(PersistedObject::new(
        SerialId(1),
        shape_payload(GeometryParams::Capsule {
            radius: 0.25,
            half_height: 0.5,
        }),
    ));
    graph.push_edge(shape, external);

    let mut reconciler = Reconciler::new(&physics);
    reconciler.bind_external(external, shared);
    let restored = reconciler.reconcile(&graph).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(physics.reference_count(shared), Some(2));

    let shape = restored.get::<Shape>(&physics, shape).unwrap();
    physics.release(shape).unwrap();
    assert_eq!(physics.reference_count(shared), Some(1));
}

#[test]
fn test_collector_leaves_externals_out() {
    let physics = test_physics();

    let shared = physics.create_material(&MaterialDesc::default()).unwrap();
    let field = physics
        .create_height_field(&HeightFieldDesc::new(2, 2, vec![0, 1, 1, 0]))
        .unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::height_field(field)).with_material(shared))
        .unwrap();
    let ground = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();
    physics.attach_shape(ground, shape).unwrap();
    physics.set_name(ground, Some("ground")).unwrap();

    let graph = {
        let view = physics.read();
        let mut collector = Collector::new(&view);
        collector.bind_external(shared, SerialId(1)).unwrap();
        collector.add_root(ground).unwrap();
        assert_eq!(collector.id_of(shared), Some(SerialId(1)));
        collector.finish()
    };
    assert_eq!(graph.len(), 3);
    assert!(graph.object(SerialId(1)).is_none());
    assert_eq!(graph.incoming(SerialId(1)), 1);

    physics.release(ground).unwrap();
    physics.release(shape).unwrap();
    physics.release(field).unwrap();
    assert_eq!(physics.object_count(), 1);

    let mut reconciler = Reconciler::new(&physics);
    reconciler.bind_external(SerialId(1), shared);
    let restored = reconciler.reconcile(&graph).unwrap();

    assert_eq!(physics.reference_count(shared), Some(2));
    let ground = restored
        .iter()
        .find_map(|(_, handle)| physics.downcast::<RigidStatic>(handle))
        .unwrap();
    assert_eq!(physics.name(ground).as_deref(), Some("ground"));
    let shape = physics.read().shapes_of(ground)[0];
    let geometry = *physics.read().geometry_of(shape).unwrap();
    assert!(matches!(geometry, Geometry::HeightField { .. }));
}

fn assert_rejected(physics: &keel_physics::testing::TestPhysics, graph: &PersistedGraph) -> SerialError {
    let error = reconcile(physics, graph).unwrap_err();
    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.tracker.total_allocations(), 0);
    assert_eq!(physics.errors.count(Severity::InvalidParameter), 1);
    physics.errors.clear();
    error
}

#[test]
fn test_invalid_graphs_allocate_nothing() {
    let physics = test_physics();

    let mut graph = scene();
    graph.objects.push(PersistedObject::new(SerialId(2), Payload::Material(MaterialDesc::ice())));
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::DuplicateId(SerialId(2))));

    let mut graph = scene();
    graph.push_edge(SerialId(3), SerialId(42));
    assert!(matches!(
        assert_rejected(&physics, &graph),
        SerialError::DanglingEdge { missing: SerialId(42), .. }
    ));

    let mut graph = scene();
    graph.push_edge(SerialId(2), SerialId(1));
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::IllegalEdge { .. }));

    let mut graph = scene();
    graph.push_edge(SerialId(5), SerialId(3));
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::DuplicateEdge { .. }));

    let mut graph = scene();
    graph.objects[0].type_id = ConcreteTypeId(99);
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::UnknownType { .. }));

    let mut graph = scene();
    graph.objects[0].type_id = keel_core::ConcreteType::Material.id();
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::PayloadMismatch { .. }));
}

#[test]
fn test_geometry_edges_must_match() {
    let physics = test_physics();

    // Mesh geometry without its mesh
    let mut graph = scene();
    graph.edges.retain(|edge| !(edge.owner == SerialId(4) && edge.target == SerialId(1)));
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::GeometryEdge { shape: SerialId(4), .. }));

    // Two meshes for one shape
    let mut graph = scene();
    graph.objects.push(PersistedObject::new(SerialId(6), Payload::TriangleMesh(quad_mesh())));
    graph.push_edge(SerialId(4), SerialId(6));
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::GeometryEdge { .. }));

    // A primitive referencing a mesh
    let mut graph = scene();
    graph.objects[3].payload = shape_payload(GeometryParams::Sphere { radius: 1.0 });
    assert!(matches!(assert_rejected(&physics, &graph), SerialError::GeometryEdge { .. }));
}

#[test]
fn test_exclusive_shape_with_two_owners() {
    let physics = test_physics();

    let mut graph = scene();
    graph.objects.push(PersistedObject::new(
        SerialId(6),
        Payload::RigidDynamic(RigidDynamicDesc::default()),
    ));
    graph.push_edge(SerialId(6), SerialId(3));
    assert!(matches!(
        assert_rejected(&physics, &graph),
        SerialError::SharedExclusiveShape { owners: 2, .. }
    ));

    // Shared shapes may have any number of owners
    if let Payload::Shape(shape) = &mut graph.objects[2].payload {
        shape.exclusive = false;
    }
    let restored = reconcile(&physics, &graph).unwrap();
    let shape = restored.get::<Shape>(&physics, SerialId(3)).unwrap();
    assert_eq!(physics.reference_count(shape), Some(3));
}

#[test]
fn test_bad_external_bindings() {
    let physics = test_physics();

    let actor = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();
    let mut graph = PersistedGraph::new();
    let shape = graph.push_object(PersistedObject::new(
        SerialId(1),
        shape_payload(GeometryParams::Plane),
    ));
    graph.push_edge(shape, SerialId(2));

    let mut reconciler = Reconciler::new(&physics);
    reconciler.bind_external(SerialId(2), actor);
    assert!(matches!(
        reconciler.reconcile(&graph),
        Err(SerialError::InvalidExternal { .. })
    ));

    let mut reconciler = Reconciler::new(&physics);
    reconciler.bind_external(SerialId(1), actor);
    assert!(matches!(
        reconciler.reconcile(&graph),
        Err(SerialError::ExternalConflict(SerialId(1)))
    ));
    assert_eq!(physics.object_count(), 1);
}

#[test]
fn test_construction_failure_rolls_back() {
    let physics = test_physics();

    let shared = physics.create_material(&MaterialDesc::default()).unwrap();
    let mut graph = scene();
    graph.push_edge(SerialId(4), SerialId(100));
    // Structurally fine, but the mesh payload itself is rejected on insert
    graph.objects.push(PersistedObject::new(
        SerialId(7),
        Payload::ConvexMesh(ConvexMeshDesc::default()),
    ));

    let mut reconciler = Reconciler::new(&physics);
    reconciler.bind_external(SerialId(100), shared);
    let result = reconciler.reconcile(&graph);
    assert!(matches!(
        result,
        Err(SerialError::Physics(PhysicsError::InvalidDescriptor(_)))
    ));

    assert_eq!(physics.object_count(), 1);
    assert_eq!(physics.reference_count(shared), Some(1));
    assert_eq!(physics.tracker.live_count(), 1);
    assert!(physics.deletions.events().is_empty());
}
