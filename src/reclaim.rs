use std::ptr::NonNull;

use crate::{
    block::{self, Header},
    grow::GrowthProvider,
    heap::Heap,
};

impl<G: GrowthProvider> Heap<G> {
    /// Wipes the block that owns `payload`, marks it free and merges it
    /// with the free blocks that follow it.
    ///
    /// **SAFETY**: `payload` must be a live allocation of this heap.
    pub(crate) unsafe fn reclaim(&mut self, payload: NonNull<u8>) {
        let mut block = unsafe { Header::from_payload(payload) };
        let header = unsafe { block.as_mut() };

        unsafe { block::wipe(payload, header.payload_size()) };
        header.is_free = true;

        let merged = unsafe { coalesce_forward(block) };
        self.counters.merges += merged;

        log::trace!("release({payload:?}) merged {merged} following blocks");
    }
}

/// Merges `block` with the run of free blocks that directly follows it.
///
/// Only contiguous blocks are merged: a neighbour in another chunk with a gap
/// in between is left alone. Blocks before `block` are never looked at, so a
/// free block followed by `block` stays a separate block.
///
/// ```text
///  before: | H free 64 | H free 128 | H free 96 | H used |
///  after:  | H free 288                         | H used |
/// ```
///
/// Returns how many blocks were absorbed.
///
/// **SAFETY**: `block` and every block reachable from it must be valid
/// headers of the same heap.
pub(crate) unsafe fn coalesce_forward(mut block: NonNull<Header>) -> usize {
    let mut merged = 0;
    let header = unsafe { block.as_mut() };

    while let Some(next) = header.next {
        let neighbour = unsafe { next.as_ref() };

        if !header.is_free || !neighbour.is_free || !Header::is_contiguous(block, header.size, next) {
            break;
        }

        header.size += neighbour.size;
        header.next = neighbour.next;
        merged += 1;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Link, list::{BlockInfo, Blocks, Chain}};

    /// Writes blocks described by `(offset, size, is_free)` into `buffer`,
    /// linked in the given order.
    fn layout(buffer: &mut [u64], blocks: &[(usize, usize, bool)]) -> NonNull<Header> {
        let base = NonNull::new(buffer.as_mut_ptr().cast::<u8>()).unwrap();
        let mut next: Link = None;

        for &(offset, size, is_free) in blocks.iter().rev() {
            next = Some(unsafe { Header::write(base.add(offset), size, is_free, next) });
        }

        next.unwrap()
    }

    fn walk(head: NonNull<Header>) -> Vec<BlockInfo> {
        Blocks::new(unsafe { Chain::new(Some(head)) }).collect()
    }

    #[test]
    fn absorbs_a_whole_run_of_free_neighbours() {
        let mut buffer = [0u64; 64];
        let head = layout(&mut buffer, &[(0, 64, true), (64, 128, true), (192, 96, true), (288, 64, false)]);

        let merged = unsafe { coalesce_forward(head) };

        let blocks = walk(head);
        assert_eq!(merged, 2);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].size, 288);
        assert_eq!(blocks[0].end(), blocks[1].address);
        assert!(!blocks[1].is_free);
    }

    #[test]
    fn stops_at_a_used_neighbour() {
        let mut buffer = [0u64; 64];
        let head = layout(&mut buffer, &[(0, 64, true), (64, 64, false), (128, 64, true)]);

        assert_eq!(unsafe { coalesce_forward(head) }, 0);
        assert_eq!(walk(head).len(), 3);
    }

    #[test]
    fn does_not_bridge_gaps_between_chunks() {
        let mut buffer = [0u64; 64];
        let head = layout(&mut buffer, &[(0, 64, true), (128, 64, true)]);

        assert_eq!(unsafe { coalesce_forward(head) }, 0);
        assert_eq!(walk(head)[0].size, 64);
    }

    #[test]
    fn used_block_is_never_merged() {
        let mut buffer = [0u64; 64];
        let head = layout(&mut buffer, &[(0, 64, false), (64, 64, true)]);

        assert_eq!(unsafe { coalesce_forward(head) }, 0);
    }

    #[test]
    fn merges_up_to_the_gap_and_keeps_the_rest_linked() {
        let mut buffer = [0u64; 64];
        let head = layout(&mut buffer, &[(0, 64, true), (64, 64, true), (256, 64, true)]);

        assert_eq!(unsafe { coalesce_forward(head) }, 1);

        let blocks = walk(head);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].size, 128);
        assert_eq!(blocks[1].address - blocks[0].address, 256);
    }

    #[test]
    fn last_block_has_nothing_to_merge() {
        let mut buffer = [0u64; 16];
        let head = layout(&mut buffer, &[(0, 128, true)]);

        assert_eq!(unsafe { coalesce_forward(head) }, 0);
        assert_eq!(walk(head)[0].size, 128);
    }
}
