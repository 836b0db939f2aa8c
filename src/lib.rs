//! # blockalloc
//!
//! A small general purpose heap allocator. Memory comes from a
//! [`GrowthProvider`] in page sized chunks and is carved into blocks, each
//! one prefixed by an in-band header:
//!
//! ```text
//! +--------------+---------------------+--------------+-------------------+
//! | Header       | payload             | Header       | payload           |
//! | size, free,  | (handed to caller)  | size, free,  |                   |
//! | next --------+---------------------+-> next ----> ...                 |
//! +--------------+---------------------+--------------+-------------------+
//! ```
//!
//! * [`Heap::allocate`] picks the first free block that is big enough
//!   (first-fit), splits off whatever it does not need and grows the heap
//!   when nothing fits.
//! * [`Heap::release`] zeroes the payload, marks the block free and merges it
//!   with the free blocks right after it (forward coalescing only).
//!
//! The heap never shrinks, has no locking and does not validate the
//! pointers it gets back.
//!
//! ```
//! use blockalloc::{FixedArena, Heap};
//!
//! let mut heap = Heap::new(FixedArena::new(64 * 1024));
//!
//! let numbers = heap.allocate(5 * 4).unwrap().cast::<u32>();
//! unsafe {
//!     for i in 0..5 {
//!         numbers.as_ptr().add(i).write(i as u32 + 1);
//!     }
//!     assert_eq!(numbers.as_ptr().add(4).read(), 5);
//!
//!     heap.release(numbers.as_ptr().cast());
//! }
//! ```

mod block;
mod config;
mod error;
mod grow;
mod heap;
#[cfg(any(unix, windows))]
mod kernel;
mod list;
mod placement;
mod reclaim;
mod utils;

pub use block::{HEADER_ALIGN, HEADER_SIZE};
pub use config::HeapConfig;
pub use error::{AllocError, ConfigError};
pub use grow::{FixedArena, GrowthProvider};
pub use heap::{Heap, HeapStats};
#[cfg(unix)]
pub use kernel::ProgramBreak;
#[cfg(any(unix, windows))]
pub use kernel::{PageMapper, page_size};
pub use list::{BlockInfo, Blocks};

#[cfg(all(test, any(unix, windows)))]
mod tests {
    use super::*;

    #[test]
    fn heap_on_mapped_pages() {
        utils::init_test_logging();
        let mut heap = Heap::with_config(PageMapper::new(), HeapConfig::system()).unwrap();

        let ptrs: Vec<_> = (1..=20).map(|i| heap.allocate(i * 100).unwrap()).collect();
        for (i, ptr) in ptrs.iter().enumerate() {
            unsafe { ptr.as_ptr().write_bytes(i as u8, (i + 1) * 100) };
        }

        assert_eq!(heap.grower().used(), heap.stats().heap_bytes);

        for ptr in ptrs.iter().rev() {
            unsafe { heap.release(ptr.as_ptr()) };
        }

        let stats = heap.stats();
        assert_eq!(stats.free_blocks, stats.blocks);
        assert_eq!(stats.free_bytes, stats.heap_bytes);
    }

    #[test]
    fn mapped_chunks_keep_the_list_address_ordered() {
        utils::init_test_logging();
        let mut heap = Heap::new(PageMapper::new());

        let ptrs: Vec<_> = (0..8).map(|_| heap.allocate(4000).unwrap()).collect();

        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        assert_eq!(heap.stats().chunks, 8);
        for pair in blocks.windows(2) {
            assert!(pair[0].end() <= pair[1].address, "{:?} is not below {:?}", pair[0], pair[1]);
        }
        for pair in ptrs.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn mapped_chunks_coalesce_across_chunk_boundaries() {
        let mut heap = Heap::new(PageMapper::new());

        let ptrs: Vec<_> = (0..4).map(|_| heap.allocate(4000).unwrap()).collect();
        for ptr in ptrs.iter().rev() {
            unsafe { heap.release(ptr.as_ptr()) };
        }

        let stats = heap.stats();
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.largest_free, stats.heap_bytes);
    }

    #[test]
    fn large_allocation_on_mapped_pages() {
        let mut heap = Heap::new(PageMapper::new());

        let big = heap.allocate(1024 * 1024).unwrap();
        unsafe {
            big.as_ptr().write_bytes(0xCD, 1024 * 1024);
            heap.release(big.as_ptr());
            assert_eq!(*big.as_ptr().add(1024 * 1024 - 1), 0);
        }
    }
}
