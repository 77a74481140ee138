//! Fixtures for tests that need a live foundation
//!
//! Only one foundation may exist per process while the test harness runs
//! tests in parallel, so [`test_physics`] holds a process-wide lock for as
//! long as the returned fixture lives.

use std::sync::Arc;

use keel_core::testing::{RecordingAssertHandler, RecordingErrorCallback};
use keel_core::ObjectHandle;
use keel_memory::{DefaultAllocator, TrackingListener};
use parking_lot::{const_mutex, Mutex, MutexGuard};

use crate::config::{FoundationDesc, PhysicsDesc};
use crate::events::{DeletionEvent, DeletionListener, ReleaseEvent};
use crate::foundation::Foundation;
use crate::physics::Physics;

static FOUNDATION_LOCK: Mutex<()> = const_mutex(());

/// Serialize a test against every other foundation user in the process
pub fn foundation_lock() -> MutexGuard<'static, ()> {
    FOUNDATION_LOCK.lock()
}

/// Deletion listener that records every notification
#[derive(Debug, Default)]
pub struct DeletionLog {
    events: Mutex<Vec<ReleaseEvent>>,
}

impl DeletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReleaseEvent> {
        self.events.lock().clone()
    }

    /// How many times `handle`'s memory was released
    pub fn destroyed(&self, handle: impl Into<ObjectHandle>) -> usize {
        let handle = handle.into();
        self.events
            .lock()
            .iter()
            .filter(|event| event.handle == handle && event.kind == DeletionEvent::MemoryRelease)
            .count()
    }

    /// Handles in destruction order
    pub fn destruction_order(&self) -> Vec<ObjectHandle> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == DeletionEvent::MemoryRelease)
            .map(|event| event.handle)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DeletionListener for DeletionLog {
    fn on_release(&self, event: &ReleaseEvent) {
        self.events.lock().push(event.clone());
    }
}

/// A physics instance on a fresh, instrumented foundation
pub struct TestPhysics {
    pub physics: Physics,
    pub errors: Arc<RecordingErrorCallback>,
    /// Lifetime violations land here instead of panicking
    pub asserts: Arc<RecordingAssertHandler>,
    pub tracker: Arc<TrackingListener>,
    pub deletions: Arc<DeletionLog>,
    _guard: MutexGuard<'static, ()>,
}

impl std::ops::Deref for TestPhysics {
    type Target = Physics;

    fn deref(&self) -> &Physics {
        &self.physics
    }
}

/// Fixture with default tolerances
pub fn test_physics() -> TestPhysics {
    test_physics_with(PhysicsDesc::default())
}

pub fn test_physics_with(desc: PhysicsDesc) -> TestPhysics {
    let guard = foundation_lock();

    let errors = Arc::new(RecordingErrorCallback::new());
    let foundation = Foundation::create(
        FoundationDesc::default().with_allocation_names(true),
        Box::new(DefaultAllocator),
        errors.clone(),
    )
    .expect("no other foundation is live while the fixture lock is held");

    let asserts = Arc::new(RecordingAssertHandler::new());
    foundation.diagnostics().set_assert_handler(asserts.clone());

    let tracker = Arc::new(TrackingListener::new());
    foundation.gateway().add_listener(tracker.clone());

    let physics = Physics::new(&foundation, desc).expect("valid physics description");
    let deletions = Arc::new(DeletionLog::new());
    physics.add_deletion_listener(deletions.clone());

    TestPhysics {
        physics,
        errors,
        asserts,
        tracker,
        deletions,
        _guard: guard,
    }
}
