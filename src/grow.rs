use std::{mem, ptr::NonNull};

use static_assertions::const_assert;

use crate::block::HEADER_ALIGN;

/// Source of fresh memory for a [`crate::Heap`].
///
/// The heap calls [`GrowthProvider::grow`] the first time it is used and
/// whenever no existing block can hold a request. It never gives memory
/// back: a provider that owns its memory (like [`FixedArena`]) keeps it until
/// it is dropped together with the heap.
///
/// # Safety
///
/// A `Some(addr)` returned by `grow(len)` must point to `len` bytes that are
/// valid for reads and writes, aligned to [`HEADER_ALIGN`], not overlapping
/// anything handed out before, and that stay valid for as long as the
/// provider lives.
pub unsafe trait GrowthProvider {
    /// Extends the memory available to the heap by `len` bytes. Returns
    /// `None` when no more memory can be supplied.
    fn grow(&mut self, len: usize) -> Option<NonNull<u8>>;
}

// Backing words of a FixedArena must be able to hold headers.
const_assert!(mem::align_of::<u64>() >= HEADER_ALIGN);

/// Growth provider over a fixed amount of memory.
///
/// Like the program break, consecutive calls to `grow` return consecutive
/// memory, so chunks obtained one after the other are contiguous. Once the
/// capacity is used up every further request fails.
///
/// ```
/// use blockalloc::{AllocError, FixedArena, Heap};
///
/// let mut heap = Heap::new(FixedArena::new(4096));
/// assert!(heap.allocate(1000).is_ok());
/// assert!(matches!(heap.allocate(5000), Err(AllocError::OutOfMemory { .. })));
/// ```
pub struct FixedArena {
    base: NonNull<u64>,
    capacity: usize,
    used: usize,
    grow_calls: usize,
}

impl FixedArena {
    /// Creates an arena able to supply `capacity` bytes (rounded up to a
    /// multiple of 8). The memory starts out zeroed.
    pub fn new(capacity: usize) -> Self {
        let words = capacity.div_ceil(mem::size_of::<u64>());
        let buffer = vec![0u64; words].into_boxed_slice();
        let base = NonNull::new(Box::into_raw(buffer).cast::<u64>())
            .unwrap_or(NonNull::dangling());

        Self {
            base,
            capacity: words * mem::size_of::<u64>(),
            used: 0,
            grow_calls: 0,
        }
    }

    /// Total bytes this arena can hand out.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of successful `grow` calls.
    #[inline]
    pub fn grow_calls(&self) -> usize {
        self.grow_calls
    }

    /// Address of the first byte of the arena.
    #[inline]
    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

unsafe impl GrowthProvider for FixedArena {
    fn grow(&mut self, len: usize) -> Option<NonNull<u8>> {
        // Keep the next chunk aligned even if someone asks for odd sizes.
        let len = len.checked_next_multiple_of(mem::size_of::<u64>())?;

        if len > self.capacity - self.used {
            return None;
        }

        // SAFETY: `used + len <= capacity`, so the chunk is inside the buffer.
        let addr = unsafe { self.base.cast::<u8>().add(self.used) };

        self.used += len;
        self.grow_calls += 1;

        Some(addr)
    }
}

impl Drop for FixedArena {
    fn drop(&mut self) {
        let words = self.capacity / mem::size_of::<u64>();

        if words == 0 {
            return;
        }

        // SAFETY: `base` and `words` describe exactly the boxed slice leaked in
        // `FixedArena::new`.
        unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), words);
            drop(Box::from_raw(slice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_hands_out_consecutive_chunks() {
        let mut arena = FixedArena::new(8192);

        let first = arena.grow(4096).unwrap();
        let second = arena.grow(4096).unwrap();

        assert_eq!(first.as_ptr() as usize, arena.base_address());
        assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 4096);
        assert_eq!(arena.used(), 8192);
        assert_eq!(arena.grow_calls(), 2);
    }

    #[test]
    fn arena_refuses_to_overcommit() {
        let mut arena = FixedArena::new(4096);

        assert!(arena.grow(8192).is_none());
        assert!(arena.grow(4096).is_some());
        assert!(arena.grow(1).is_none());
        assert_eq!(arena.grow_calls(), 1);
    }

    #[test]
    fn arena_capacity_is_rounded_to_words() {
        let mut arena = FixedArena::new(13);

        assert_eq!(arena.capacity(), 16);
        let chunk = arena.grow(3).unwrap();
        assert_eq!(chunk.as_ptr() as usize % HEADER_ALIGN, 0);
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn empty_arena_never_grows() {
        let mut arena = FixedArena::new(0);

        assert_eq!(arena.capacity(), 0);
        assert!(arena.grow(8).is_none());
    }

    #[test]
    fn arena_memory_starts_zeroed() {
        let mut arena = FixedArena::new(64);
        let chunk = arena.grow(64).unwrap();

        let bytes = unsafe { std::slice::from_raw_parts(chunk.as_ptr(), 64) };
        assert!(bytes.iter().all(|&byte| byte == 0));
    }
}
