//! Allocation gateway - the single channel for kernel allocations
//!
//! The host supplies an [`AllocatorCallback`]; the gateway wraps it with the
//! alignment contract, out-of-memory reporting and instrumentation listeners.

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};
use std::alloc::{alloc, dealloc, Layout};

use keel_core::{DiagnosticChannel, Severity, SourceLocation};
use parking_lot::RwLock;

use crate::{align_up, is_aligned};

/// Alignment every gateway allocation satisfies
pub const GATEWAY_ALIGN: usize = 16;

/// Type name forwarded when allocation names are suppressed
pub const NAMES_DISABLED: &str = "<allocation names disabled>";

/// Host-supplied allocator backend
pub trait AllocatorCallback: Send + Sync {
    /// Allocate `size` bytes aligned to [`GATEWAY_ALIGN`], or `None`
    fn allocate(&self, size: usize, type_name: &str, location: SourceLocation)
        -> Option<NonNull<u8>>;

    /// Release memory obtained from `allocate`
    ///
    /// # Safety
    /// `ptr` must come from this callback's `allocate` and not be freed yet.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);
}

/// Instrumentation hook notified of every gateway allocation
pub trait AllocationListener: Send + Sync {
    fn on_allocation(
        &self,
        size: usize,
        type_name: &str,
        location: SourceLocation,
        ptr: NonNull<u8>,
    );

    fn on_deallocation(&self, ptr: NonNull<u8>);
}

/// System allocator with a size header in front of every block
///
/// The header keeps `deallocate` pointer-only. It is padded to
/// [`GATEWAY_ALIGN`] so the payload keeps the block's alignment.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl DefaultAllocator {
    const HEADER: usize = align_up(core::mem::size_of::<usize>(), GATEWAY_ALIGN);
}

impl AllocatorCallback for DefaultAllocator {
    fn allocate(&self, size: usize, _type_name: &str, _location: SourceLocation)
        -> Option<NonNull<u8>> {
        let total = size.checked_add(Self::HEADER)?;
        let layout = Layout::from_size_align(total, GATEWAY_ALIGN).ok()?;

        // Safety: layout has a non-zero size because of the header
        let base = NonNull::new(unsafe { alloc(layout) })?;
        unsafe {
            base.as_ptr().cast::<usize>().write(total);
            Some(NonNull::new_unchecked(base.as_ptr().add(Self::HEADER)))
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let base = ptr.as_ptr().sub(Self::HEADER);
        let total = base.cast::<usize>().read();
        dealloc(base, Layout::from_size_align_unchecked(total, GATEWAY_ALIGN));
    }
}

/// The process-wide allocation channel
pub struct AllocationGateway {
    allocator: Box<dyn AllocatorCallback>,
    diagnostics: Arc<DiagnosticChannel>,
    report_names: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn AllocationListener>>>,
}

impl AllocationGateway {
    pub fn new(
        allocator: Box<dyn AllocatorCallback>,
        diagnostics: Arc<DiagnosticChannel>,
        report_names: bool,
    ) -> Self {
        Self {
            allocator,
            diagnostics,
            report_names: AtomicBool::new(report_names),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Allocate `size` bytes aligned to [`GATEWAY_ALIGN`]
    ///
    /// Failure is reported at [`Severity::OutOfMemory`] and yields `None`.
    /// It is never retried.
    pub fn allocate(
        &self,
        size: usize,
        type_tag: &str,
        location: SourceLocation,
    ) -> Option<NonNull<u8>> {
        let type_name = if self.reports_allocation_names() {
            type_tag
        } else {
            NAMES_DISABLED
        };

        let Some(ptr) = self.allocator.allocate(size, type_name, location) else {
            self.diagnostics.report(
                Severity::OutOfMemory,
                &format!("allocation of {} bytes for '{}' failed", size, type_tag),
                location,
            );
            return None;
        };

        if !is_aligned(ptr.as_ptr(), GATEWAY_ALIGN) {
            self.diagnostics.report(
                Severity::InternalError,
                &format!(
                    "allocator returned {:p} for '{}', which is not {}-byte aligned",
                    ptr, type_tag, GATEWAY_ALIGN
                ),
                location,
            );
            // Safety: the pointer came from this allocator just now
            unsafe { self.allocator.deallocate(ptr) };
            return None;
        }

        for listener in self.listeners.read().iter() {
            listener.on_allocation(size, type_name, location, ptr);
        }
        Some(ptr)
    }

    /// Release memory obtained from [`allocate`](Self::allocate); `None` is a no-op
    ///
    /// # Safety
    /// `ptr` must come from this gateway and not have been released already.
    pub unsafe fn deallocate(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };
        for listener in self.listeners.read().iter() {
            listener.on_deallocation(ptr);
        }
        self.allocator.deallocate(ptr);
    }

    pub fn reports_allocation_names(&self) -> bool {
        self.report_names.load(Ordering::Relaxed)
    }

    /// Toggle type-name resolution for instrumentation
    pub fn set_report_allocation_names(&self, enabled: bool) {
        self.report_names.store(enabled, Ordering::Relaxed);
    }

    pub fn add_listener(&self, listener: Arc<dyn AllocationListener>) {
        self.listeners.write().push(listener);
    }

    /// Deregister a listener, returning whether it was registered
    pub fn remove_listener(&self, listener: &Arc<dyn AllocationListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticChannel> {
        &self.diagnostics
    }
}

impl fmt::Debug for AllocationGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationGateway")
            .field("report_names", &self.reports_allocation_names())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use keel_core::testing::RecordingErrorCallback;
    use parking_lot::Mutex;

    struct FailingAllocator;

    impl AllocatorCallback for FailingAllocator {
        fn allocate(&self, _: usize, _: &str, _: SourceLocation) -> Option<NonNull<u8>> {
            None
        }

        unsafe fn deallocate(&self, _: NonNull<u8>) {
            unreachable!("nothing was allocated");
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<(usize, String, SourceLocation)>>);

    impl AllocationListener for Seen {
        fn on_allocation(&self, size: usize, name: &str, location: SourceLocation, _: NonNull<u8>) {
            self.0.lock().push((size, name.to_string(), location));
        }

        fn on_deallocation(&self, _: NonNull<u8>) {}
    }

    fn gateway(report_names: bool) -> (AllocationGateway, Arc<RecordingErrorCallback>) {
        let sink = Arc::new(RecordingErrorCallback::new());
        let channel = Arc::new(DiagnosticChannel::new(sink.clone()));
        (
            AllocationGateway::new(Box::new(DefaultAllocator), channel, report_names),
            sink,
        )
    }

    #[test]
    fn test_alignment_for_all_sizes() {
        let (gateway, sink) = gateway(true);
        let sizes = [0usize, 1, 3, 8, 15, 16, 17, 31, 64, 100, 4095, 65536];

        let ptrs: Vec<_> = sizes
            .iter()
            .map(|&size| gateway.allocate(size, "Bytes", SourceLocation::caller()).unwrap())
            .collect();

        for ptr in &ptrs {
            assert!(is_aligned(ptr.as_ptr(), GATEWAY_ALIGN));
        }
        for ptr in ptrs {
            unsafe { gateway.deallocate(Some(ptr)) };
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_deallocate_none_is_noop() {
        let (gateway, sink) = gateway(true);
        unsafe { gateway.deallocate(None) };
        assert!(sink.is_empty());
    }

    #[test]
    fn test_out_of_memory_is_reported() {
        let sink = Arc::new(RecordingErrorCallback::new());
        let channel = Arc::new(DiagnosticChannel::new(sink.clone()));
        let gateway = AllocationGateway::new(Box::new(FailingAllocator), channel, true);

        assert!(gateway.allocate(128, "Mesh", SourceLocation::caller()).is_none());
        assert_eq!(sink.count(Severity::OutOfMemory), 1);
        assert!(sink.contains(Severity::OutOfMemory, "Mesh"));
    }

    #[test]
    fn test_listener_sees_tag_and_location() {
        let (gateway, _sink) = gateway(true);
        let seen = Arc::new(Seen::default());
        let listener: Arc<dyn AllocationListener> = seen.clone();
        gateway.add_listener(listener.clone());

        let location = SourceLocation::new("scene/loader.rs", 77);
        let ptr = gateway.allocate(48, "HeightField", location);
        unsafe { gateway.deallocate(ptr) };

        assert_eq!(
            seen.0.lock().as_slice(),
            &[(48, "HeightField".to_string(), location)]
        );

        assert!(gateway.remove_listener(&listener));
        assert!(!gateway.remove_listener(&listener));
    }

    #[test]
    fn test_names_can_be_suppressed() {
        let (gateway, _sink) = gateway(false);
        let seen = Arc::new(Seen::default());
        gateway.add_listener(seen.clone());

        let ptr = gateway.allocate(8, "Material", SourceLocation::caller());
        unsafe { gateway.deallocate(ptr) };
        assert_eq!(seen.0.lock()[0].1, NAMES_DISABLED);

        gateway.set_report_allocation_names(true);
        let ptr = gateway.allocate(8, "Material", SourceLocation::caller());
        unsafe { gateway.deallocate(ptr) };
        assert_eq!(seen.0.lock()[1].1, "Material");
    }
}
