//! # keel_memory - Allocation Gateway
//!
//! Every allocation the Keel kernel makes goes through one
//! [`AllocationGateway`]:
//! - Host-pluggable backend via [`AllocatorCallback`]
//! - 16-byte alignment contract on every returned block
//! - Out-of-memory reporting through the diagnostic channel
//! - Instrumentation listeners with optional type-name resolution
//!
//! [`GatewayBox`] is the owning pointer the kernel stores its objects in.

extern crate alloc;

pub mod boxed;
pub mod error;
pub mod gateway;

#[cfg(any(test, feature = "tracking"))]
pub mod tracker;

pub use boxed::GatewayBox;
pub use error::AllocError;
pub use gateway::{
    AllocationGateway, AllocationListener, AllocatorCallback, DefaultAllocator, GATEWAY_ALIGN,
    NAMES_DISABLED,
};

#[cfg(any(test, feature = "tracking"))]
pub use tracker::{AllocationRecord, TrackingListener};

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Check if a pointer is aligned
#[inline]
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    (ptr as usize) & (align - 1) == 0
}

pub mod prelude {
    pub use crate::{AllocationGateway, AllocationListener, AllocatorCallback, DefaultAllocator};
    pub use crate::{GatewayBox, GATEWAY_ALIGN};
}
