//! Allocation tracking - a listener that accounts for live gateway memory

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::HashMap;

use keel_core::SourceLocation;
use parking_lot::Mutex;

use crate::gateway::AllocationListener;

/// A live allocation as seen by [`TrackingListener`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub size: usize,
    pub type_name: String,
    pub location: SourceLocation,
}

/// Listener that keeps a table of every outstanding allocation
#[derive(Debug, Default)]
pub struct TrackingListener {
    live: Mutex<HashMap<usize, AllocationRecord>>,
    total_allocations: AtomicU64,
    total_deallocations: AtomicU64,
}

impl TrackingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocations not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Bytes held by allocations not yet released
    pub fn live_bytes(&self) -> usize {
        self.live.lock().values().map(|record| record.size).sum()
    }

    /// Live allocation counts grouped by type name
    pub fn live_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.live.lock().values() {
            *counts.entry(record.type_name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Snapshot of every outstanding allocation
    pub fn live_records(&self) -> Vec<AllocationRecord> {
        self.live.lock().values().cloned().collect()
    }

    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }

    pub fn total_deallocations(&self) -> u64 {
        self.total_deallocations.load(Ordering::Relaxed)
    }
}

impl AllocationListener for TrackingListener {
    fn on_allocation(
        &self,
        size: usize,
        type_name: &str,
        location: SourceLocation,
        ptr: NonNull<u8>,
    ) {
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(
            ptr.as_ptr() as usize,
            AllocationRecord {
                size,
                type_name: type_name.to_string(),
                location,
            },
        );
    }

    fn on_deallocation(&self, ptr: NonNull<u8>) {
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);
        if self.live.lock().remove(&(ptr.as_ptr() as usize)).is_none() {
            log::warn!("Untracked deallocation at {:p}", ptr);
        }
    }
}
