use std::{cmp, ptr::NonNull};

use crate::{
    block::{HEADER_ALIGN, HEADER_SIZE, Header, Link},
    config::HeapConfig,
    error::{AllocError, ConfigError},
    grow::GrowthProvider,
    list::{Blocks, Chain},
    utils::align,
};

/// A heap of blocks laid out inside memory obtained from a
/// [`GrowthProvider`].
///
/// Every block starts with a header (size, free flag and a link to the next
/// block in address order) followed by the payload handed to callers:
///
/// ```text
///           chunk 1 (grown once)                       chunk 2
/// +--------+--------+--------+----------+      +--------+----------------+
/// | H used | H free | H used | H free   | ---> | H used | H free         |
/// +--------+--------+--------+----------+      +--------+----------------+
///   head ----> next ---> next ---> next -------> next ---> next ---> None
/// ```
///
/// Requests are served first-fit, oversized blocks are split and released
/// blocks are merged with the free blocks that follow them. The heap only
/// grows; memory goes back to the provider when the heap is dropped, if the
/// provider supports that at all.
///
/// A `Heap` contains raw pointers and is neither `Send` nor `Sync`: it has no
/// locking and must only be used from one thread.
pub struct Heap<G: GrowthProvider> {
    /// Where new chunks come from.
    pub(crate) grower: G,
    pub(crate) config: HeapConfig,
    /// First block of the list, `None` until the first allocation.
    pub(crate) head: Link,
    pub(crate) counters: Counters,
}

/// Running totals kept by the heap itself.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub chunks: usize,
    pub heap_bytes: usize,
    pub allocations: usize,
    pub releases: usize,
    pub merges: usize,
}

/// Usage figures reported by [`Heap::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Chunks obtained from the growth provider.
    pub chunks: usize,
    /// Bytes obtained from the growth provider.
    pub heap_bytes: usize,
    /// Successful calls to [`Heap::allocate`].
    pub allocations: usize,
    /// Calls to [`Heap::release`] with a non-null pointer.
    pub releases: usize,
    /// Blocks absorbed by forward coalescing.
    pub merges: usize,
    /// Blocks currently in the list.
    pub blocks: usize,
    pub free_blocks: usize,
    /// Sum of the sizes (headers included) of the free blocks.
    pub free_bytes: usize,
    /// Size of the biggest free block, header included.
    pub largest_free: usize,
}

impl<G: GrowthProvider> Heap<G> {
    /// Creates an empty heap with the default [`HeapConfig`]. Nothing is
    /// requested from `grower` until the first allocation.
    pub const fn new(grower: G) -> Self {
        Self {
            grower,
            config: HeapConfig::new(),
            head: None,
            counters: Counters {
                chunks: 0,
                heap_bytes: 0,
                allocations: 0,
                releases: 0,
                merges: 0,
            },
        }
    }

    /// Creates an empty heap using `config`.
    pub fn with_config(grower: G, config: HeapConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut heap = Self::new(grower);
        heap.config = config;

        Ok(heap)
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The growth provider backing this heap.
    #[inline]
    pub fn grower(&self) -> &G {
        &self.grower
    }

    /// Tells whether the heap has grown at least once.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.head.is_some()
    }

    /// Allocates at least `size` bytes and returns a pointer to them.
    ///
    /// The payload is aligned to [`HEADER_ALIGN`] and is not zeroed: it holds
    /// whatever the growth provider supplied, or zeros if it was used and
    /// released before.
    ///
    /// A failed allocation leaves the heap untouched.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            log::trace!("allocate(0) rejected");
            return Err(AllocError::InvalidArgument);
        }

        let total = self.block_size_for(size)?;
        let block = self.find_free_block(total)?;

        unsafe {
            self.split_block(block, total);
            (*block.as_ptr()).is_free = false;
        }

        self.counters.allocations += 1;

        let payload = Header::payload(block);
        log::trace!("allocate({size}) -> {payload:?} (block of {total} bytes)");

        Ok(payload)
    }

    /// Gives back a payload obtained from [`Heap::allocate`].
    ///
    /// The payload is zeroed, the block is marked free and merged with the
    /// free blocks that directly follow it. Null pointers are ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`Heap::allocate`] on this
    /// same heap that has not been released yet. Nothing checks this: foreign
    /// or double released pointers silently corrupt the block list. The
    /// payload must not be used after this call.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        unsafe { self.reclaim(payload) };

        self.counters.releases += 1;
    }

    /// Iterates over all blocks in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        // SAFETY: every header reachable from `head` lives in memory owned by
        // `self.grower`, which outlives the borrow of `self`.
        Blocks::new(unsafe { Chain::new(self.head) })
    }

    /// Walks the block list and reports usage.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            chunks: self.counters.chunks,
            heap_bytes: self.counters.heap_bytes,
            allocations: self.counters.allocations,
            releases: self.counters.releases,
            merges: self.counters.merges,
            ..HeapStats::default()
        };

        for block in self.blocks() {
            stats.blocks += 1;

            if block.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free = cmp::max(stats.largest_free, block.size);
            }
        }

        stats
    }

    /// Total block size needed to serve a request of `size` bytes: payload
    /// plus header, rounded up to the header alignment and never below the
    /// minimum block size.
    ///
    /// Requests whose chunk could not even be computed are rejected here too,
    /// before any search or growth happens.
    pub(crate) fn block_size_for(&self, size: usize) -> Result<usize, AllocError> {
        let overflow = AllocError::Overflow { size };

        let total = size
            .checked_add(HEADER_SIZE)
            .and_then(|total| align(total, HEADER_ALIGN))
            .ok_or(overflow)?;
        let total = cmp::max(total, self.config.min_block_size());

        self.config.chunk_size(total).ok_or(overflow)?;

        Ok(total)
    }
}

impl<G: GrowthProvider + Default> Default for Heap<G> {
    fn default() -> Self {
        Self::new(G::default())
    }
}
