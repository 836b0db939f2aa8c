use std::ptr::NonNull;

use crate::{
    block::Header,
    error::AllocError,
    grow::GrowthProvider,
    heap::Heap,
    list::Chain,
};

impl<G: GrowthProvider> Heap<G> {
    /// Returns a free block of at least `total` bytes.
    ///
    /// This uses the first-fit algorithm: blocks are checked in address order
    /// and the first free one that is big enough wins. If there is none, the
    /// heap grows by a page-rounded chunk which is appended at the tail of the
    /// list. The very first call creates the list itself.
    pub(crate) fn find_free_block(&mut self, total: usize) -> Result<NonNull<Header>, AllocError> {
        let Some(head) = self.head else {
            // We have no blocks yet. The first chunk becomes the head.
            let block = self.grow_heap(total)?;
            self.head = Some(block);

            return Ok(block);
        };

        let mut last = head;

        // SAFETY: the list only contains headers written by this heap inside
        // memory owned by the growth provider.
        for block in unsafe { Chain::new(Some(head)) } {
            let header = unsafe { block.as_ref() };

            if header.is_free && header.size >= total {
                return Ok(block);
            }

            last = block;
        }

        // There is no free block we can use, so we need more memory. The new
        // chunk is only linked once the provider actually gave it to us.
        let block = self.grow_heap(total)?;

        unsafe {
            (*last.as_ptr()).next = Some(block);
        }

        Ok(block)
    }

    /// Requests a chunk big enough for a block of `total` bytes and writes a
    /// single free block spanning all of it. The block is not linked.
    fn grow_heap(&mut self, total: usize) -> Result<NonNull<Header>, AllocError> {
        let chunk = self
            .config
            .chunk_size(total)
            .ok_or(AllocError::Overflow { size: total })?;

        let Some(addr) = self.grower.grow(chunk) else {
            log::warn!("growth provider refused a {chunk} byte chunk");
            return Err(AllocError::OutOfMemory { requested: chunk });
        };

        self.counters.chunks += 1;
        self.counters.heap_bytes += chunk;

        log::debug!(
            "heap grew by {chunk} bytes at {addr:?} ({} chunks, {} bytes total)",
            self.counters.chunks,
            self.counters.heap_bytes
        );

        // SAFETY: the provider guarantees `chunk` aligned, writable bytes.
        Ok(unsafe { Header::write(addr, chunk, true, None) })
    }

    /// Carves the tail of `block` into a new free block when what is left
    /// after the first `total` bytes can still be a block on its own.
    ///
    /// ```text
    ///  before:  | H size=S free | ................................... |
    ///  after:   | H size=total  | ........ | H size=S-total free | ... |
    ///                                      ^ block + total
    /// ```
    ///
    /// Otherwise the whole block is handed out and up to
    /// `min_block_size - 1` bytes stay unused at its end.
    ///
    /// **SAFETY**: `block` must be a block of this heap with
    /// `size >= total`, and `total` must be a multiple of the header alignment.
    pub(crate) unsafe fn split_block(&mut self, mut block: NonNull<Header>, total: usize) {
        let min_block = self.config.min_block_size();
        let header = unsafe { block.as_mut() };

        debug_assert!(header.size >= total);

        if header.size - total < min_block {
            return;
        }

        let remainder = unsafe {
            Header::write(
                block.cast::<u8>().add(total),
                header.size - total,
                true,
                header.next,
            )
        };

        log::trace!(
            "split {:?}: {} -> {total} + {}",
            block,
            header.size,
            header.size - total
        );

        header.size = total;
        header.next = Some(remainder);
    }
}
