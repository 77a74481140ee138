//! Bulk loading with caller-supplied counts

use keel_core::Severity;
use keel_physics::prelude::*;
use keel_physics::testing::test_physics;

fn quad_mesh() -> TriangleMeshDesc {
    TriangleMeshDesc::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}

#[test]
fn test_loaded_counts_drive_destruction() {
    let _ = env_logger::builder().is_test(true).try_init();
    let physics = test_physics();

    let (mesh, first, second, actor) = physics
        .load(|batch| -> Result<_> {
            // Creator plus two shapes
            let mesh = batch.insert_triangle_mesh(&quad_mesh(), Some("floor"), 3)?;
            let desc = ShapeDesc::new(Geometry::triangle_mesh(mesh));
            // Creator plus the actor below
            let first = batch.insert_shape(&desc, None, 2)?;
            let second = batch.insert_shape(&desc, None, 1)?;
            let actor = batch.insert_rigid_static(&RigidStaticDesc::default(), &[first], None)?;
            assert_eq!(batch.created().len(), 4);
            Ok((mesh, first, second, actor))
        })
        .unwrap();

    assert_eq!(physics.reference_count(mesh), Some(3));
    assert_eq!(physics.reference_count(first), Some(2));
    assert_eq!(physics.name(mesh).as_deref(), Some("floor"));
    assert_eq!(physics.read().shapes_of(actor), &[first]);

    physics.release(actor).unwrap();
    physics.release(first).unwrap();
    assert_eq!(physics.reference_count(mesh), Some(2));
    physics.release(second).unwrap();
    physics.release(mesh).unwrap();

    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.deletions.destroyed(mesh), 1);
    assert!(physics.errors.is_empty());
}

#[test]
fn test_references_to_existing_objects() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let loose = physics
        .create_shape(&ShapeDesc::new(Geometry::sphere(1.0)).with_material(material))
        .unwrap();
    assert_eq!(physics.reference_count(material), Some(2));

    let body = physics
        .load(|batch| -> Result<_> {
            let shape = batch.insert_shape(
                &ShapeDesc::new(Geometry::capsule(0.5, 1.0)).with_material(material),
                None,
                1,
            )?;
            batch.add_references(material, 1)?;
            batch.add_references(loose, 1)?;
            batch.insert_rigid_dynamic(&RigidDynamicDesc::default(), &[shape, loose], Some("crate"))
        })
        .unwrap();

    assert_eq!(physics.reference_count(material), Some(3));
    assert_eq!(physics.reference_count(loose), Some(2));
    assert_eq!(physics.read().shapes_of(body).len(), 2);

    physics.release(loose).unwrap();
    physics.release(material).unwrap();
    physics.release(body).unwrap();
    assert_eq!(physics.object_count(), 0);
}

#[test]
fn test_failed_load_rolls_back() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    let loose = physics
        .create_shape(&ShapeDesc::new(Geometry::sphere(1.0)).with_material(material))
        .unwrap();
    let allocated = physics.tracker.live_count();

    let result = physics.load(|batch| -> Result<()> {
        batch.add_references(material, 2)?;
        batch.add_references(loose, 1)?;
        batch.insert_rigid_static(&RigidStaticDesc::default(), &[loose], None)?;
        batch.insert_convex_mesh(&ConvexMeshDesc::default(), None, 1)?;
        Ok(())
    });
    assert!(matches!(result, Err(PhysicsError::InvalidDescriptor(_))));

    assert_eq!(physics.object_count(), 2);
    assert_eq!(physics.reference_count(material), Some(2));
    assert_eq!(physics.reference_count(loose), Some(1));
    assert!(physics.read().get_as(loose).unwrap().actors().is_empty());
    assert_eq!(physics.tracker.live_count(), allocated);
    assert_eq!(physics.errors.count(Severity::InvalidParameter), 1);

    // Nothing from the batch was ever visible, so no listener fired
    assert!(physics.deletions.events().is_empty());
}

#[test]
fn test_zero_count_for_shared_object_is_rejected() {
    let physics = test_physics();

    let result = physics.load(|batch| batch.insert_material(&MaterialDesc::ice(), None, 0));
    assert!(matches!(result, Err(PhysicsError::InvalidDescriptor(_))));
    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.tracker.total_allocations(), 0);
}

#[test]
fn test_batch_rejects_dead_targets() {
    let physics = test_physics();

    let material = physics.create_material(&MaterialDesc::default()).unwrap();
    physics.release(material).unwrap();

    let result = physics.load(|batch| -> Result<()> {
        batch.insert_triangle_mesh(&quad_mesh(), None, 1)?;
        batch.insert_shape(&ShapeDesc::new(Geometry::Plane).with_material(material), None, 1)?;
        Ok(())
    });
    assert!(matches!(result, Err(PhysicsError::StaleHandle(_))));
    assert_eq!(physics.asserts.failures().len(), 1);
    assert_eq!(physics.object_count(), 0);
    assert_eq!(physics.tracker.live_count(), 0);
}

#[test]
fn test_overflowing_tally_adds_nothing() {
    let physics = test_physics();

    let ice = physics.create_material(&MaterialDesc::ice()).unwrap();
    let rubber = physics.create_material(&MaterialDesc::default()).unwrap();

    let result = physics.load(|batch| -> Result<()> {
        batch.add_references(ice, 2)?;
        batch.add_references(rubber, u32::MAX)?;
        Ok(())
    });
    assert!(matches!(result, Err(PhysicsError::ReferenceCount { .. })));
    assert_eq!(physics.asserts.failures().len(), 1);

    // The rejected tally left no partial increments, and the rollback undid the applied one
    assert_eq!(physics.reference_count(ice), Some(1));
    assert_eq!(physics.reference_count(rubber), Some(1));

    physics.release(ice).unwrap();
    physics.release(rubber).unwrap();
    assert_eq!(physics.object_count(), 0);
}
