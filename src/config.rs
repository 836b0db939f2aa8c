use crate::{
    block::{HEADER_ALIGN, HEADER_SIZE},
    error::ConfigError,
    utils::align,
};

/// Tunables of a [`crate::Heap`].
///
/// ```
/// use blockalloc::HeapConfig;
///
/// let config = HeapConfig::default().with_page_size(16 * 1024);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.page_size(), 16 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    page_size: usize,
    min_payload: usize,
}

impl HeapConfig {
    /// Every chunk requested from the growth provider is a multiple of this.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;

    /// Smallest payload a split-off remainder block may have.
    pub const DEFAULT_MIN_PAYLOAD: usize = 16;

    pub const fn new() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
            min_payload: Self::DEFAULT_MIN_PAYLOAD,
        }
    }

    /// Same as [`HeapConfig::new`] but rounding chunks to the page size the
    /// operating system reports.
    #[cfg(any(unix, windows))]
    pub fn system() -> Self {
        Self::new().with_page_size(crate::kernel::page_size())
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub const fn with_min_payload(mut self, min_payload: usize) -> Self {
        self.min_payload = min_payload;
        self
    }

    #[inline]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub const fn min_payload(&self) -> usize {
        self.min_payload
    }

    /// Smallest block the heap ever creates, header included.
    #[inline]
    pub const fn min_block_size(&self) -> usize {
        HEADER_SIZE + self.min_payload
    }

    /// Checks that the values keep every header aligned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.page_size.is_power_of_two() || self.page_size < HEADER_ALIGN {
            return Err(ConfigError::PageSize(self.page_size, HEADER_ALIGN));
        }

        if self.min_payload == 0 || self.min_payload % HEADER_ALIGN != 0 {
            return Err(ConfigError::MinPayload(self.min_payload, HEADER_ALIGN));
        }

        Ok(())
    }

    /// Size of the chunk we ask the growth provider for when a block of
    /// `total` bytes has to be created.
    pub(crate) fn chunk_size(&self, total: usize) -> Option<usize> {
        align(total, self.page_size)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HeapConfig::default();

        assert_eq!(config.page_size(), 4096);
        assert_eq!(config.min_payload(), 16);
        assert_eq!(config.min_block_size(), HEADER_SIZE + 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_page_sizes_that_are_not_powers_of_two() {
        let config = HeapConfig::new().with_page_size(3000);

        assert_eq!(
            config.validate(),
            Err(ConfigError::PageSize(3000, HEADER_ALIGN))
        );
    }

    #[test]
    fn rejects_misaligned_min_payload() {
        let config = HeapConfig::new().with_min_payload(HEADER_ALIGN + 1);

        assert!(matches!(config.validate(), Err(ConfigError::MinPayload(..))));
        assert!(HeapConfig::new().with_min_payload(0).validate().is_err());
    }

    #[test]
    fn chunks_are_page_multiples() {
        let config = HeapConfig::new();

        assert_eq!(config.chunk_size(1), Some(4096));
        assert_eq!(config.chunk_size(4096), Some(4096));
        assert_eq!(config.chunk_size(4097), Some(8192));
        assert_eq!(config.chunk_size(usize::MAX), None);
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn system_config_is_valid() {
        assert!(HeapConfig::system().validate().is_ok());
    }
}
