//! Object lifecycle tests: factories, ownership edges and destruction

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keel_core::{AnyActor, ConcreteType, Severity};
use keel_physics::prelude::*;
use keel_physics::testing::test_physics;
use keel_physics::{DeletionEvent, DeletionListener, GeometryKind, ReleaseEvent};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quad_mesh() -> TriangleMeshDesc {
    TriangleMeshDesc::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}

fn terrain() -> HeightFieldDesc {
    HeightFieldDesc::new(3, 3, vec![0, 1, 0, 1, 2, 1, 0, 1, 0])
}

#[test]
fn test_shape_actor_mesh_scenario() {
    init_logging();
    let physics = test_physics();

    let mesh = physics.create_triangle_mesh(&quad_mesh()).unwrap();
    assert_eq!(physics.reference_count(mesh), Some(1));

    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::triangle_mesh(mesh)))
        .unwrap();
    assert_eq!(physics.reference_count(mesh), Some(2));
    assert_eq!(physics.reference_count(shape), Some(1));

    let actor = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();
    physics.attach_shape(actor, shape).unwrap();
    assert_eq!(physics.reference_count(shape), Some(2));
    assert_eq!(physics.reference_count(mesh), Some(2));

    physics.release(shape).unwrap();
    assert_eq!(physics.reference_count(shape), Some(1));
    assert_eq!(physics.reference_count(mesh), Some(2));

    physics.release(actor).unwrap();
    assert!(!physics.is_alive(actor));
    assert!(!physics.is_alive(shape));
    assert_eq!(physics.reference_count(mesh), Some(1));
    assert_eq!(physics.deletions.destroyed(shape), 1);

    physics.release(mesh).unwrap();
    assert!(!physics.is_alive(mesh));
    assert_eq!(physics.deletions.destroyed(mesh), 1);
    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.tracker.live_count(), 0);
    assert!(physics.errors.is_empty());
}

#[test]
fn test_detach_drops_the_edge() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::sphere(0.5)).with_material(material))
        .unwrap();
    let body = physics.create_rigid_dynamic(&RigidDynamicDesc::default()).unwrap();

    physics.attach(body, shape).unwrap();
    assert_eq!(physics.reference_count(shape), Some(2));
    assert_eq!(physics.read().shapes_of(body), &[shape]);

    physics.detach(body, shape).unwrap();
    assert_eq!(physics.reference_count(shape), Some(1));
    assert!(physics.read().shapes_of(body).is_empty());

    // Detaching the last reference destroys the shape and its material edge
    physics.release(material).unwrap();
    physics.attach_shape(body, shape).unwrap();
    physics.release(shape).unwrap();
    physics.detach_shape(body, shape).unwrap();
    assert!(!physics.is_alive(shape));
    assert!(!physics.is_alive(material));
    assert!(physics.is_alive(body));
}

#[test]
fn test_edge_errors() {
    let physics = test_physics();

    let mesh = physics.create_triangle_mesh(&quad_mesh()).unwrap();
    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::triangle_mesh(mesh)))
        .unwrap();
    let actor = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();
    let other = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();

    // No edge from a material to a mesh
    let result = physics.attach(material, mesh);
    assert!(matches!(result, Err(PhysicsError::InvalidEdge { .. })));

    // The geometry edge is replaced, not attached
    let result = physics.attach(shape, mesh);
    assert!(matches!(result, Err(PhysicsError::GeometryEdge { .. })));
    let result = physics.detach(shape, mesh);
    assert!(matches!(result, Err(PhysicsError::GeometryEdge { .. })));

    physics.attach_shape(actor, shape).unwrap();
    let result = physics.attach_shape(actor, shape);
    assert!(matches!(result, Err(PhysicsError::AlreadyAttached { .. })));

    // Shapes are exclusive unless created shared
    let result = physics.attach_shape(other, shape);
    assert!(matches!(result, Err(PhysicsError::ExclusiveShape { .. })));

    let result = physics.detach_shape(other, shape);
    assert!(matches!(result, Err(PhysicsError::NotAttached { .. })));

    let result = physics.detach(shape, material);
    assert!(matches!(result, Err(PhysicsError::MaterialNotUsed { .. })));

    // None of these touched a count
    assert_eq!(physics.reference_count(mesh), Some(2));
    assert_eq!(physics.reference_count(shape), Some(2));
    assert_eq!(physics.reference_count(material), Some(1));

    assert_eq!(physics.errors.count(Severity::InvalidParameter), 1);
    assert_eq!(physics.errors.count(Severity::InvalidOperation), 6);
    assert!(physics.asserts.failures().is_empty());
}

#[test]
fn test_shared_shape_on_many_actors() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::wood()).unwrap();
    let shape = physics
        .create_shape(
            &ShapeDesc::new(Geometry::cuboid(0.5, 0.5, 0.5))
                .with_material(material)
                .shared(),
        )
        .unwrap();
    physics.release(material).unwrap();

    let actors: Vec<_> = (0..3)
        .map(|_| physics.create_rigid_static(&RigidStaticDesc::default()).unwrap())
        .collect();
    for actor in &actors {
        physics.attach_shape(*actor, shape).unwrap();
    }
    assert_eq!(physics.reference_count(shape), Some(4));

    let view = physics.read();
    let owners = view.get_as(shape).unwrap().actors().to_vec();
    drop(view);
    assert_eq!(owners.len(), 3);

    physics.release(shape).unwrap();
    for actor in actors {
        assert!(physics.is_alive(shape));
        physics.release(actor).unwrap();
    }
    assert!(!physics.is_alive(shape));
    assert!(!physics.is_alive(material));
}

#[test]
fn test_set_geometry_swaps_edges() {
    let physics = test_physics();

    let mesh = physics.create_triangle_mesh(&quad_mesh()).unwrap();
    let field = physics.create_height_field(&terrain()).unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::triangle_mesh(mesh)))
        .unwrap();
    physics.release(mesh).unwrap();
    assert_eq!(physics.reference_count(mesh), Some(1));

    // Re-setting the same resource must not destroy it on the way
    physics.set_geometry(shape, Geometry::triangle_mesh(mesh)).unwrap();
    assert_eq!(physics.reference_count(mesh), Some(1));

    physics.set_geometry(shape, Geometry::height_field(field)).unwrap();
    assert!(!physics.is_alive(mesh));
    assert_eq!(physics.reference_count(field), Some(2));

    physics.set_geometry(shape, Geometry::capsule(0.25, 1.0)).unwrap();
    assert_eq!(physics.reference_count(field), Some(1));

    let result = physics.set_geometry(shape, Geometry::sphere(-1.0));
    assert!(matches!(result, Err(PhysicsError::InvalidDescriptor(_))));
    assert_eq!(
        physics.read().geometry_of(shape).map(Geometry::kind),
        Some(GeometryKind::Capsule)
    );
}

#[test]
fn test_set_materials_counts_before_dropping() {
    let physics = test_physics();

    let ice = physics.create_material(&MaterialDesc::ice()).unwrap();
    let rubber = physics.create_material(&MaterialDesc::rubber()).unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::sphere(1.0)).with_material(ice))
        .unwrap();
    physics.release(ice).unwrap();

    physics.set_materials(shape, &[ice, rubber]).unwrap();
    assert_eq!(physics.reference_count(ice), Some(1));
    assert_eq!(physics.reference_count(rubber), Some(2));

    physics.set_materials(shape, &[rubber]).unwrap();
    assert!(!physics.is_alive(ice));

    physics.add_material(shape, rubber).unwrap();
    assert_eq!(physics.reference_count(rubber), Some(3));
    physics.remove_material(shape, rubber).unwrap();
    assert_eq!(physics.read().materials_of(shape), &[rubber]);
}

#[test]
fn test_create_shape_with_dead_resource_is_trapped() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    physics.release(material).unwrap();

    let before = physics.tracker.total_allocations();
    let result = physics.create_shape(&ShapeDesc::new(Geometry::Plane).with_material(material));
    assert!(matches!(result, Err(PhysicsError::StaleHandle(_))));
    assert_eq!(physics.asserts.failures().len(), 1);

    // The shape's record was allocated, then handed back
    assert_eq!(physics.tracker.total_allocations(), before + 1);
    assert_eq!(physics.tracker.live_count(), 0);
    assert_eq!(physics.object_count(), 0);
}

#[test]
fn test_invalid_descriptors_are_reported() {
    let physics = test_physics();

    let result = physics.create_triangle_mesh(&TriangleMeshDesc::default());
    assert!(matches!(result, Err(PhysicsError::InvalidDescriptor(_))));
    let result = physics.create_rigid_dynamic(&RigidDynamicDesc::default().with_mass(-2.0));
    assert!(result.is_err());
    let result = physics.create_material(&MaterialDesc::new(0.5, 0.5, 4.0));
    assert!(result.is_err());

    assert_eq!(physics.errors.count(Severity::InvalidParameter), 3);
    assert!(physics
        .errors
        .reports()
        .iter()
        .all(|report| report.location.file == file!()));
    assert_eq!(physics.tracker.total_allocations(), 0);
}

#[test]
fn test_tolerance_defaults() {
    let physics = keel_physics::testing::test_physics_with(
        PhysicsDesc::default().with_tolerances(TolerancesScale::new(2.0, 20.0)),
    );

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let shape = physics
        .create_shape(&ShapeDesc::new(Geometry::sphere(1.0)).with_material(material))
        .unwrap();
    let body = physics.create_rigid_dynamic(&RigidDynamicDesc::default()).unwrap();

    let view = physics.read();
    let contact_offset = view.get_as(shape).unwrap().contact_offset();
    let sleep_threshold = view.get_as(body).unwrap().sleep_threshold();
    approx::assert_relative_eq!(contact_offset, 0.04, epsilon = 1e-6);
    approx::assert_relative_eq!(sleep_threshold, 0.02, epsilon = 1e-6);
}

#[test]
fn test_names_and_user_data() {
    let physics = test_physics();

    let actor = physics.create_rigid_static(&RigidStaticDesc::default()).unwrap();
    assert_eq!(physics.name(actor), None);
    physics.set_name(actor, Some("ground")).unwrap();
    assert_eq!(physics.name(actor).as_deref(), Some("ground"));

    physics.set_user_data(actor, 42u64).unwrap();
    assert_eq!(physics.with_user_data(actor, |value: &u64| *value + 1), Some(43));
    assert_eq!(physics.with_user_data(actor, |value: &String| value.clone()), None);
    assert_eq!(physics.take_user_data::<String>(actor), None);
    assert_eq!(physics.take_user_data::<u64>(actor), Some(42));
    assert_eq!(physics.take_user_data::<u64>(actor), None);

    // User data is dropped together with its object
    let token = Arc::new(());
    physics.set_user_data(actor, token.clone()).unwrap();
    assert_eq!(Arc::strong_count(&token), 2);
    physics.release(actor).unwrap();
    assert_eq!(Arc::strong_count(&token), 1);

    let events = physics.deletions.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, DeletionEvent::UserRelease);
    assert_eq!(events[1].kind, DeletionEvent::MemoryRelease);
    assert_eq!(events[1].name.as_deref(), Some("ground"));
    assert_eq!(events[1].concrete_type, ConcreteType::RigidStatic);
}

struct MemoryOnly(AtomicUsize);

impl DeletionListener for MemoryOnly {
    fn on_release(&self, _event: &ReleaseEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn wants(&self, kind: DeletionEvent) -> bool {
        kind == DeletionEvent::MemoryRelease
    }
}

#[test]
fn test_deletion_listener_registration() {
    let physics = test_physics();

    let listener = Arc::new(MemoryOnly(AtomicUsize::new(0)));
    let registered: Arc<dyn DeletionListener> = listener.clone();
    physics.add_deletion_listener(registered.clone());

    let first = physics.create_material(&MaterialDesc::default()).unwrap();
    physics.release(first).unwrap();
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);

    assert!(physics.remove_deletion_listener(&registered));
    assert!(!physics.remove_deletion_listener(&registered));

    let second = physics.create_material(&MaterialDesc::default()).unwrap();
    physics.release(second).unwrap();
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_object_enumeration() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let statics: Vec<_> = (0..2)
        .map(|_| physics.create_rigid_static(&RigidStaticDesc::default()).unwrap())
        .collect();
    let body = physics.create_rigid_dynamic(&RigidDynamicDesc::default()).unwrap();

    assert_eq!(physics.object_count(), 4);
    assert_eq!(physics.count_of(ConcreteType::RigidStatic), 2);
    assert_eq!(physics.objects_of::<RigidStatic>(), statics);
    assert_eq!(physics.objects_of::<AnyActor>().len(), 3);
    assert_eq!(physics.objects_of::<Material>(), vec![material]);

    let view = physics.read();
    let object = view.get(body).unwrap();
    assert_eq!(object.concrete_type_name(), "RigidDynamic");
    assert!(object.downcast_ref::<RigidDynamic>().is_some());
    assert_eq!(view.len(), 4);
}
