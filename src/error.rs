use thiserror::Error;

use crate::PageNum;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read failed for page {page}: {source}")]
    ReadPage {
        page: PageNum,
        source: std::io::Error,
    },

    #[error("Write failed for page {page}: {source}")]
    WritePage {
        page: PageNum,
        source: std::io::Error,
    },

    #[error("No unpinned frame available for page {0}")]
    PoolSaturated(PageNum),

    #[error("Invalid frame count: {0}")]
    InvalidFrameCount(usize),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("Frame {0} is out of range for this pool")]
    InvalidHandle(usize),

    #[error("Frame {0} is not pinned")]
    NotPinned(usize),
}

impl BufferError {
    /// Whether the error reports a broken caller contract (stale or foreign
    /// handle, releasing a pin that was never taken) rather than a runtime
    /// condition such as an IO failure or a saturated pool.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidHandle(_) | Self::NotPinned(_))
    }
}

pub type BufferResult<T> = Result<T, BufferError>;
