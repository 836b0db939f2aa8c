use std::{
    mem,
    ptr::{self, NonNull},
    sync::atomic::{self, Ordering},
};

use static_assertions::const_assert;

/// Non-null pointer to a [`Header`], or the end of the block list.
pub(crate) type Link = Option<NonNull<Header>>;

/// Size in bytes of the metadata that precedes every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Every block starts at a multiple of this value and every block size is a
/// multiple of it, so headers and payloads are always word aligned.
pub const HEADER_ALIGN: usize = mem::align_of::<Header>();

const_assert!(HEADER_SIZE % HEADER_ALIGN == 0);
const_assert!(HEADER_ALIGN >= mem::align_of::<usize>());

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed right after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        | -> Header
/// +---------------------+        |
/// |        next         |        |
/// +---------------------+ <------+ <-- pointer handed to the caller
/// |       Content       |        |
/// |         ...         |        | -> Payload (size - HEADER_SIZE bytes)
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Blocks are threaded together through `next` in address order. Two
/// consecutive blocks are not necessarily contiguous: chunks handed out by
/// different growth calls may leave a gap between them.
#[repr(C)]
pub(crate) struct Header {
    /// Size of the whole block, header included.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Next block in address order.
    pub next: Link,
}

impl Header {
    /// Writes a brand new header at `addr` and returns a pointer to it.
    ///
    /// **SAFETY**: `addr` must be aligned to [`HEADER_ALIGN`] and valid for
    /// writes of `size` bytes, `size >= HEADER_SIZE`.
    pub unsafe fn write(addr: NonNull<u8>, size: usize, is_free: bool, next: Link) -> NonNull<Header> {
        debug_assert!(size >= HEADER_SIZE);
        debug_assert_eq!(addr.as_ptr() as usize % HEADER_ALIGN, 0);

        let header = addr.cast::<Header>();

        unsafe {
            header.as_ptr().write(Header { size, is_free, next });
        }

        header
    }

    /// Recovers the header that precedes a payload returned by the heap.
    ///
    /// **SAFETY**: `payload` must have been obtained from [`Header::payload`].
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Header> {
        unsafe { payload.sub(HEADER_SIZE).cast() }
    }

    /// First byte after the header.
    #[inline]
    pub fn payload(header: NonNull<Header>) -> NonNull<u8> {
        // SAFETY: every block is at least HEADER_SIZE bytes long, so the
        // payload starts at most one byte past the end of the block.
        unsafe { header.cast::<u8>().add(HEADER_SIZE) }
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// Tells whether `next` starts exactly where the block at `header` ends.
    #[inline]
    pub fn is_contiguous(header: NonNull<Header>, size: usize, next: NonNull<Header>) -> bool {
        header.as_ptr() as usize + size == next.as_ptr() as usize
    }
}

/// Zeroes `len` bytes starting at `payload`.
///
/// Released memory may hold secrets, so the writes are volatile and fenced:
/// the optimizer is not allowed to drop them even though nobody reads the
/// bytes afterwards.
///
/// **SAFETY**: `payload` must be valid for writes of `len` bytes.
pub(crate) unsafe fn wipe(payload: NonNull<u8>, len: usize) {
    let base = payload.as_ptr();

    for offset in 0..len {
        unsafe { ptr::write_volatile(base.add(offset), 0) };
    }

    atomic::compiler_fence(Ordering::SeqCst);
}
