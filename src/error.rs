use thiserror::Error;

/// Reasons why [`crate::Heap::allocate`] could not hand out memory.
///
/// A failed allocation never leaves a partially linked block behind: the heap
/// looks exactly as it did before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Zero sized requests are always rejected.
    #[error("cannot allocate zero bytes")]
    InvalidArgument,

    /// The request is so large that adding the block header (or rounding it
    /// to the header alignment or to a page) would wrap around.
    #[error("allocation of {size} bytes overflows the block size computation")]
    Overflow { size: usize },

    /// The growth provider refused to extend the heap.
    #[error("growth provider could not supply a {requested} byte chunk")]
    OutOfMemory { requested: usize },
}

/// Invalid [`crate::HeapConfig`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("page size {0} must be a power of two no smaller than {1}")]
    PageSize(usize, usize),

    #[error("minimum payload {0} must be a non-zero multiple of {1}")]
    MinPayload(usize, usize),
}
