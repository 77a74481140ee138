//! Error types for gateway allocations

use alloc::string::String;

use thiserror::Error;

/// Gateway allocation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The host allocator could not satisfy the request
    #[error("Out of memory allocating {size} bytes for '{type_tag}'")]
    OutOfMemory { size: usize, type_tag: String },
}

/// Result type for allocation operations
pub type Result<T> = core::result::Result<T, AllocError>;
