//! Generational handles to kernel objects
//!
//! Handles name objects without pointing at them. Every slot carries a
//! generation counter that is bumped when its object is destroyed, so a handle
//! kept past its object's destruction is detected as stale instead of aliasing
//! whatever lands in the slot next.

use alloc::vec::Vec;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::types::{AnyObject, ObjectType};

/// An untyped handle to a kernel object
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle {
    /// Lower 32 bits: index, Upper 32 bits: generation
    bits: u64,
}

impl ObjectHandle {
    /// The null handle, never valid
    pub const NULL: ObjectHandle = ObjectHandle { bits: u64::MAX };

    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == u64::MAX
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }
}

impl Default for ObjectHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ObjectHandle(null)")
        } else {
            write!(f, "ObjectHandle({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

/// A handle statically known to refer to an object of kind `T`
///
/// Typed handles are only minted by factories and by downcasts, so the kind
/// is always checked once at the boundary.
#[repr(transparent)]
pub struct Handle<T: ?Sized> {
    raw: ObjectHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ObjectType> Handle<T> {
    /// Wrap a raw handle without checking its kind
    ///
    /// Callers must have verified that the object matches `T`.
    #[doc(hidden)]
    #[inline]
    pub const fn from_raw_unchecked(raw: ObjectHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn raw(&self) -> ObjectHandle {
        self.raw
    }

    /// Forget the static kind
    #[inline]
    pub const fn erase(self) -> Handle<AnyObject> {
        Handle::from_raw_unchecked(self.raw)
    }
}

impl<T: ObjectType> From<Handle<T>> for ObjectHandle {
    #[inline]
    fn from(handle: Handle<T>) -> Self {
        handle.raw
    }
}

// Implemented by hand so `T` needs no bounds of its own
impl<T: ?Sized> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Handle<T> {}

impl<T: ?Sized> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> PartialEq<ObjectHandle> for Handle<T> {
    #[inline]
    fn eq(&self, other: &ObjectHandle) -> bool {
        self.raw == *other
    }
}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ObjectType> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", T::NAME, self.raw)
    }
}

/// Hands out slot indices and tracks each slot's generation
///
/// A freed slot is reused by the next allocation with its generation bumped,
/// so handles from the previous occupant stop validating.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    generations: Vec<u32>,
    occupied: Vec<bool>,
    vacant: Vec<u32>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            occupied: Vec::with_capacity(capacity),
            vacant: Vec::new(),
        }
    }

    /// Next handle, or `None` once every index below the null index is live
    pub fn allocate(&mut self) -> Option<ObjectHandle> {
        if let Some(slot) = self.vacant.pop() {
            self.occupied[slot as usize] = true;
            return Some(ObjectHandle::new(slot, self.generations[slot as usize]));
        }
        let slot = u32::try_from(self.generations.len())
            .ok()
            .filter(|slot| *slot < u32::MAX)?;
        self.generations.push(0);
        self.occupied.push(true);
        Some(ObjectHandle::new(slot, 0))
    }

    /// Retire `handle`; false if it was already stale or names a vacant slot
    pub fn free(&mut self, handle: ObjectHandle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let slot = handle.index() as usize;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.occupied[slot] = false;
        self.vacant.push(handle.index());
        true
    }

    /// Whether `handle` names an occupied slot at its current generation
    pub fn is_valid(&self, handle: ObjectHandle) -> bool {
        let slot = handle.index() as usize;
        !handle.is_null()
            && self.occupied.get(slot) == Some(&true)
            && self.generations[slot] == handle.generation()
    }

    /// Live handles
    pub fn len(&self) -> usize {
        self.generations.len() - self.vacant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots ever handed out, vacant ones included
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

/// Slot storage addressed by generational handles
#[derive(Debug)]
pub struct HandleMap<T> {
    slots: HandleAllocator,
    entries: Vec<Option<T>>,
}

impl<T> HandleMap<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HandleAllocator::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Store `value` in a fresh or recycled slot
    ///
    /// # Panics
    /// When all 2^32 - 1 slots are live at once.
    pub fn insert(&mut self, value: T) -> ObjectHandle {
        let Some(handle) = self.slots.allocate() else {
            panic!("object table is full ({} live slots)", self.slots.len());
        };
        let slot = handle.index() as usize;
        if slot == self.entries.len() {
            self.entries.push(Some(value));
        } else {
            self.entries[slot] = Some(value);
        }
        handle
    }

    /// Take the value out and retire its handle
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<T> {
        if self.slots.free(handle) {
            self.entries[handle.index() as usize].take()
        } else {
            None
        }
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&T> {
        self.slots
            .is_valid(handle)
            .then(|| self.entries[handle.index() as usize].as_ref())
            .flatten()
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        if self.slots.is_valid(handle) {
            self.entries[handle.index() as usize].as_mut()
        } else {
            None
        }
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slots.is_valid(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &T)> {
        let generations = &self.slots.generations;
        self.entries
            .iter()
            .zip(generations)
            .enumerate()
            .filter_map(|(slot, (entry, generation))| {
                let value = entry.as_ref()?;
                Some((ObjectHandle::new(slot as u32, *generation), value))
            })
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnyActor;

    #[test]
    fn test_handle_packing() {
        let handle = ObjectHandle::new(42, 7);
        assert_eq!(handle.index(), 42);
        assert_eq!(handle.generation(), 7);
        assert_eq!(ObjectHandle::from_bits(handle.to_bits()), handle);
        assert!(ObjectHandle::NULL.is_null());
        assert!(!handle.is_null());
    }

    #[test]
    fn test_recycled_slot_gets_new_generation() {
        let mut slots = HandleAllocator::new();
        let mesh = slots.allocate().unwrap();
        let material = slots.allocate().unwrap();
        assert_ne!(mesh, material);

        assert!(slots.free(mesh));
        assert!(!slots.free(mesh), "double free must be refused");
        assert!(!slots.is_valid(mesh));
        assert!(slots.is_valid(material));

        let shape = slots.allocate().unwrap();
        assert_eq!(shape.index(), mesh.index());
        assert_eq!(shape.generation(), mesh.generation() + 1);
        assert!(!slots.is_valid(mesh));
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.capacity(), 2);
        assert!(!slots.is_valid(ObjectHandle::NULL));
    }

    #[test]
    fn test_stale_handles_miss_in_map() {
        let mut table: HandleMap<u32> = HandleMap::new();
        let first = table.insert(10);
        let second = table.insert(20);

        assert_eq!(table.remove(first), Some(10));
        assert_eq!(table.get(first), None);
        assert_eq!(table.remove(first), None);

        let third = table.insert(30);
        assert_eq!(third.index(), first.index());
        assert_eq!(table.get(first), None);
        assert_eq!(table.get(third), Some(&30));
        if let Some(value) = table.get_mut(second) {
            *value += 1;
        }

        let live: Vec<_> = table.iter().collect();
        assert_eq!(live, vec![(third, &30), (second, &21)]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_vacant_slot_handles_never_validate() {
        let mut table: HandleMap<&str> = HandleMap::new();
        let mesh = table.insert("mesh");
        assert_eq!(table.remove(mesh), Some("mesh"));

        // The generation the slot will carry next, while nothing lives there
        let forged = ObjectHandle::new(mesh.index(), mesh.generation() + 1);
        assert!(!table.contains(forged));
        assert_eq!(table.get(forged), None);
        assert_eq!(table.remove(forged), None);

        let shape = table.insert("shape");
        let actor = table.insert("actor");
        assert_ne!(shape, actor);
        assert_eq!(shape, forged);
        assert_eq!(table.get(shape), Some(&"shape"));
        assert_eq!(table.get(actor), Some(&"actor"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_typed_handle_erase() {
        let raw = ObjectHandle::new(3, 1);
        let typed: Handle<AnyActor> = Handle::from_raw_unchecked(raw);
        assert_eq!(ObjectHandle::from(typed), raw);
        assert_eq!(typed.erase().raw(), raw);
        assert_eq!(format!("{:?}", typed), "Handle<Actor>(3v1)");
    }
}
