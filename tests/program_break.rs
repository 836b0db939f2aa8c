//! `sbrk` moves a process wide pointer, so this lives in its own test binary
//! with a single test: nothing else in the process grows the break while it
//! runs.
#![cfg(unix)]

use blockalloc::{AllocError, GrowthProvider, Heap, ProgramBreak};

#[test]
fn heap_grows_the_program_break() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut heap = Heap::new(ProgramBreak::new());
    let before = ProgramBreak::current();

    let first = heap.allocate(16).unwrap();
    assert!(first.as_ptr() as usize >= before);
    assert!(ProgramBreak::current() >= before + heap.config().page_size());
    assert_eq!(heap.stats().heap_bytes, heap.config().page_size());

    unsafe {
        first.as_ptr().write_bytes(0x42, 16);
        heap.release(first.as_ptr());
        assert_eq!(*first.as_ptr(), 0);
    }

    let again = heap.allocate(8).unwrap();
    assert_eq!(again, first);
    assert_eq!(heap.stats().chunks, 1);

    let big = heap.allocate(64 * 1024).unwrap();
    assert!(big.as_ptr() as usize > first.as_ptr() as usize);
    assert_eq!(heap.stats().chunks, 2);

    unsafe {
        heap.release(big.as_ptr());
        heap.release(again.as_ptr());
    }

    // A refused growth leaves the break untouched, alignment padding included.
    let huge = isize::MAX as usize / 2;
    let before = ProgramBreak::current();
    assert!(ProgramBreak::new().grow(huge).is_none());
    assert_eq!(ProgramBreak::current(), before);

    let stats = heap.stats();
    assert!(matches!(heap.allocate(huge), Err(AllocError::OutOfMemory { .. })));
    assert_eq!(ProgramBreak::current(), before);
    assert_eq!(heap.stats(), stats);
}
