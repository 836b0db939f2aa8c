//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

/// It aligns `to_be_aligned` up to the next multiple of `alignment`, which has
/// to be a power of two.
///
/// This is used to round chunk sizes up to [`crate::HeapConfig::page_size`]
/// and block sizes up to the header alignment, so every header we write lands
/// on a properly aligned address.
///
/// Returns `None` if rounding up would wrap around `usize::MAX`.
pub(crate) fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());

    to_be_aligned
        .checked_add(alignment - 1)
        .map(|size| size & !(alignment - 1))
}

/// Installs `env_logger` once per test binary so `RUST_LOG=trace` shows what
/// the heap is doing.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn align_pointer_size() {
        let word = mem::size_of::<usize>();
        let alignments = (0..4).map(|i| ((i * word + 1)..=((i + 1) * word), (i + 1) * word));

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(Some(expected), align(size, word));
            }
        }
    }

    #[test]
    fn align_page_size() {
        // For testing purposes we are assuming the page size is 4096
        let alignments = vec![(1..4096, 4096), (4097..8192, 8192)];

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(Some(expected), align(size, 4096))
            }
        }
    }

    #[test]
    fn aligned_values_are_kept() {
        assert_eq!(Some(0), align(0, 8));
        assert_eq!(Some(4096), align(4096, 4096));
    }

    #[test]
    fn align_reports_wraparound() {
        assert_eq!(None, align(usize::MAX, 8));
        assert_eq!(None, align(usize::MAX - 4094, 4096));
    }
}
