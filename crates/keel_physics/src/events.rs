//! Deletion notifications

use keel_core::{ConcreteType, ObjectHandle};

/// Which stage of an object's end a notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionEvent {
    /// The object can no longer be reached through any handle
    UserRelease,
    /// The object's memory has been returned to the gateway
    MemoryRelease,
}

/// A destroyed object, as seen by deletion listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub handle: ObjectHandle,
    pub concrete_type: ConcreteType,
    pub name: Option<String>,
    pub kind: DeletionEvent,
}

/// Observer of object destruction
///
/// Called on the thread that triggered the destruction, after the object
/// table lock has been released. Listeners may call back into `Physics`.
pub trait DeletionListener: Send + Sync {
    fn on_release(&self, event: &ReleaseEvent);

    /// Events this listener wants; both by default
    fn wants(&self, kind: DeletionEvent) -> bool {
        let _ = kind;
        true
    }
}
