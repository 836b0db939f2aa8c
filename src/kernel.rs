//! Growth providers backed by the operating system.
//!
//! Here is where we deal with the low level memory requests as well as the
//! platform-dependant stuff. The heap itself only knows about
//! [`GrowthProvider`].

use std::{ptr::NonNull, sync::OnceLock};

use crate::grow::GrowthProvider;

/// Virtual memory page size of the computer. This is usually 4096, but we
/// can't know it at compile time so it is queried once and cached.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The heap, our top level view of this, has nothing to do with
/// the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Reserves `len` bytes of address space without making them accessible.
    /// It returns a Pointer to the start of the range or None if the
    /// underlying syscall fails.
    unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>>;

    /// Makes `len` bytes starting at the page aligned `addr`, inside a
    /// reserved range, readable and writable.
    unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool;

    /// Returns the whole range of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { PageMapper::page_size() })
}

/// Growth provider that carves chunks out of one reserved range of address
/// space (`mmap(PROT_NONE)` + `mprotect` on unix, `VirtualAlloc` with
/// `MEM_RESERVE` then `MEM_COMMIT` on windows).
///
/// The range is reserved on the first `grow` and pages are committed as
/// chunks are handed out. Like the program break, consecutive chunks are
/// contiguous and always at increasing addresses, so the block list stays
/// address ordered. Once the reservation is used up every request fails.
///
/// The reservation is returned to the kernel when the provider (and with it
/// the heap) is dropped.
pub struct PageMapper {
    /// Start of the reserved range, `None` until the first growth.
    base: Option<NonNull<u8>>,
    reservation: usize,
    /// Bytes handed out to the heap.
    used: usize,
    /// Bytes made accessible, always a multiple of the page size.
    committed: usize,
}

impl PageMapper {
    /// Address space reserved by [`PageMapper::new`].
    pub const DEFAULT_RESERVATION: usize = if usize::BITS >= 64 { 1 << 30 } else { 1 << 26 };

    pub fn new() -> Self {
        Self::with_reservation(Self::DEFAULT_RESERVATION)
    }

    /// Creates a provider that can hand out up to `reservation` bytes,
    /// rounded up to whole pages.
    pub fn with_reservation(reservation: usize) -> Self {
        let page = page_size();

        Self {
            base: None,
            reservation: reservation.div_ceil(page).saturating_mul(page),
            used: 0,
            committed: 0,
        }
    }

    /// Bytes of address space this provider can hand out.
    #[inline]
    pub fn reservation(&self) -> usize {
        self.reservation
    }

    /// Bytes handed out so far.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes currently readable and writable.
    #[inline]
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Start of the reserved range, once something was reserved.
    pub fn base_address(&self) -> Option<usize> {
        self.base.map(|base| base.as_ptr() as usize)
    }

    fn reserve(&mut self) -> Option<NonNull<u8>> {
        if let Some(base) = self.base {
            return Some(base);
        }

        let Some(base) = (unsafe { Self::reserve_memory(self.reservation) }) else {
            log::warn!("could not reserve {} bytes of address space", self.reservation);
            return None;
        };

        log::debug!("reserved {} bytes at {base:?}", self.reservation);
        self.base = Some(base);

        Some(base)
    }
}

impl Default for PageMapper {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GrowthProvider for PageMapper {
    fn grow(&mut self, len: usize) -> Option<NonNull<u8>> {
        use crate::block::HEADER_ALIGN;

        if len == 0 || self.reservation == 0 {
            return None;
        }

        // Keep the next chunk aligned even if someone asks for odd sizes.
        let len = len.checked_next_multiple_of(HEADER_ALIGN)?;
        if len > self.reservation - self.used {
            return None;
        }

        let base = self.reserve()?;
        let end = self.used + len;

        if end > self.committed {
            let target = end.next_multiple_of(page_size());
            // SAFETY: `committed` is page aligned and `target <= reservation`
            // because the reservation is a whole number of pages.
            let commit_at = unsafe { base.add(self.committed) };

            if !unsafe { Self::commit_memory(commit_at, target - self.committed) } {
                log::warn!("could not commit {} bytes at {commit_at:?}", target - self.committed);
                return None;
            }

            self.committed = target;
        }

        // SAFETY: `used + len <= reservation`.
        let addr = unsafe { base.add(self.used) };
        self.used = end;

        Some(addr)
    }
}

impl Drop for PageMapper {
    fn drop(&mut self) {
        if let Some(base) = self.base.take() {
            unsafe { Self::return_memory(base, self.reservation) };
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::{PageMapper, PlatformMemory};

    use libc::{mmap, mprotect, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const NORESERVE: c_int = libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const NORESERVE: c_int = 0;

    impl PlatformMemory for PageMapper {
        unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // No access until pages are committed.
            const PROT: c_int = libc::PROT_NONE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | NORESERVE;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => NonNull::new(addr.cast::<u8>()),
                }
            }
        }

        unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;

            unsafe { mprotect(addr.as_ptr().cast::<c_void>(), len as size_t, PROT) == 0 }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{PageMapper, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for PageMapper {
        unsafe fn reserve_memory(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let addr = Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn commit_memory(addr: NonNull<u8>, len: usize) -> bool {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            unsafe {
                let committed = Memory::VirtualAlloc(
                    Some(addr.as_ptr() as *const c_void),
                    len,
                    Memory::MEM_COMMIT,
                    protection,
                );

                !committed.is_null()
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr() as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

/// Growth provider that moves the program break with `sbrk(2)`, exactly like
/// a classic `malloc`.
///
/// Successive chunks are contiguous unless someone else moved the break in
/// between. When the break is not word aligned a few padding bytes are
/// taken first; they are given back if the growth itself fails.
///
/// `sbrk` is process global and not thread safe, so a heap using this
/// provider must be the only code moving the break while it grows.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct ProgramBreak {
    _private: (),
}

#[cfg(unix)]
impl ProgramBreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current program break, as returned by `sbrk(0)`.
    pub fn current() -> usize {
        unsafe { libc::sbrk(0) as usize }
    }
}

#[cfg(unix)]
unsafe impl GrowthProvider for ProgramBreak {
    fn grow(&mut self, len: usize) -> Option<NonNull<u8>> {
        use crate::block::HEADER_ALIGN;

        let increment = libc::intptr_t::try_from(len).ok()?;

        unsafe {
            let current = libc::sbrk(0) as usize;
            if current == usize::MAX {
                return None;
            }

            // The break is not guaranteed to be word aligned, so burn the
            // few bytes needed to get there first.
            let padding = current.next_multiple_of(HEADER_ALIGN) - current;
            if padding != 0 && libc::sbrk(padding as libc::intptr_t) as usize == usize::MAX {
                log::warn!("sbrk({padding}) failed while aligning the break");
                return None;
            }

            let addr = libc::sbrk(increment);
            if addr as usize == usize::MAX {
                log::warn!("sbrk({len}) failed");

                // Give the alignment bytes back so a failed growth leaves the
                // break where it was.
                if padding != 0 {
                    libc::sbrk(-(padding as libc::intptr_t));
                }

                return None;
            }

            NonNull::new(addr.cast::<u8>())
        }
    }
}
