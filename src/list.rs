use std::{marker::PhantomData, ptr::NonNull};

use crate::block::{HEADER_SIZE, Header, Link};

/// Walks the raw block list from `head` following `next` links.
///
/// This is the only way the heap traverses its blocks. It yields the headers
/// themselves so the placement and reclamation code can mutate them.
pub(crate) struct Chain<'a> {
    current: Link,
    marker: PhantomData<&'a Header>,
}

impl<'a> Chain<'a> {
    /// **SAFETY**: every header reachable from `head` must be valid for the
    /// lifetime `'a`.
    pub unsafe fn new(head: Link) -> Self {
        Self {
            current: head,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Chain<'a> {
    type Item = NonNull<Header>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }

        Some(node)
    }
}

/// Read-only snapshot of one block, as reported by [`crate::Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// Address of the block header.
    pub address: usize,
    /// Size of the block, header included.
    pub size: usize,
    pub is_free: bool,
}

impl BlockInfo {
    /// Address handed out by [`crate::Heap::allocate`] for this block.
    #[inline]
    pub fn payload_address(&self) -> usize {
        self.address + HEADER_SIZE
    }

    /// Usable bytes of the block.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// One past the last byte of the block.
    #[inline]
    pub fn end(&self) -> usize {
        self.address + self.size
    }

    /// Tells whether `address` lies inside the payload of this block.
    pub fn contains(&self, address: usize) -> bool {
        (self.payload_address()..self.end()).contains(&address)
    }
}

/// Iterator over the blocks of a heap in address order.
pub struct Blocks<'a> {
    chain: Chain<'a>,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(chain: Chain<'a>) -> Self {
        Self { chain }
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.chain.next()?;
        let header = unsafe { node.as_ref() };

        Some(BlockInfo {
            address: node.as_ptr() as usize,
            size: header.size,
            is_free: header.is_free,
        })
    }
}
