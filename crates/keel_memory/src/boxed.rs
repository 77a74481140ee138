//! Owning pointers whose storage comes from the allocation gateway

use alloc::sync::Arc;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use keel_core::SourceLocation;

use crate::error::AllocError;
use crate::gateway::{AllocationGateway, GATEWAY_ALIGN};

/// A `Box`-like owner allocated through an [`AllocationGateway`]
///
/// Dropping the box drops the value and hands the memory back to the same
/// gateway it came from.
pub struct GatewayBox<T> {
    ptr: NonNull<T>,
    gateway: Arc<AllocationGateway>,
    _owns: PhantomData<T>,
}

// Safety: GatewayBox owns its T exactly like Box<T> does
unsafe impl<T: Send> Send for GatewayBox<T> {}
unsafe impl<T: Sync> Sync for GatewayBox<T> {}

impl<T> GatewayBox<T> {
    const ALIGN_OK: () = assert!(
        core::mem::align_of::<T>() <= GATEWAY_ALIGN,
        "type is over-aligned for the allocation gateway"
    );

    /// Move `value` into gateway memory, tagged with its Rust type name
    #[track_caller]
    pub fn new(gateway: &Arc<AllocationGateway>, value: T) -> Result<Self, AllocError> {
        Self::new_tagged(gateway, value, core::any::type_name::<T>())
    }

    /// Move `value` into gateway memory under an explicit type tag
    #[track_caller]
    pub fn new_tagged(
        gateway: &Arc<AllocationGateway>,
        value: T,
        type_tag: &str,
    ) -> Result<Self, AllocError> {
        Self::new_at(gateway, value, type_tag, SourceLocation::caller())
    }

    /// Move `value` into gateway memory, attributing the allocation to `location`
    pub fn new_at(
        gateway: &Arc<AllocationGateway>,
        value: T,
        type_tag: &str,
        location: SourceLocation,
    ) -> Result<Self, AllocError> {
        #[allow(clippy::let_unit_value)]
        let () = Self::ALIGN_OK;

        let size = core::mem::size_of::<T>();
        let raw = gateway
            .allocate(size, type_tag, location)
            .ok_or_else(|| AllocError::OutOfMemory {
                size,
                type_tag: type_tag.into(),
            })?;

        let ptr = raw.cast::<T>();
        // Safety: fresh allocation of size_of::<T>() bytes, 16-byte aligned
        unsafe { ptr.as_ptr().write(value) };

        Ok(Self {
            ptr,
            gateway: gateway.clone(),
            _owns: PhantomData,
        })
    }

    /// The gateway that owns this box's memory
    pub fn gateway(&self) -> &Arc<AllocationGateway> {
        &self.gateway
    }
}

impl<T> Deref for GatewayBox<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: ptr is valid and initialized for the box's lifetime
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for GatewayBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: unique ownership
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for GatewayBox<T> {
    fn drop(&mut self) {
        // Safety: the value is initialized and the memory came from this gateway
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            self.gateway.deallocate(Some(self.ptr.cast::<u8>()));
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for GatewayBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
