//! Single-threaded page buffer manager: a fixed-frame LRU cache with pin
//! semantics over a file of fixed-size pages.
//!
//! Callers pin pages with [`BufferPool::fix`] (read through the cache) or
//! [`BufferPool::fix_empty`] (skip the read for brand-new pages), touch the
//! bytes through the returned [`PageHandle`], mark in-place mutations with
//! [`BufferPool::mark_dirty`], and release pins with [`BufferPool::unpin`].
//! Dirty pages reach the backing file on eviction, [`BufferPool::flush_all`],
//! or close.

mod error;
mod pool;
mod stats;
mod store;

pub use error::{BufferError, BufferResult};
pub use pool::{BufferPool, PageHandle};
pub use stats::UsageStats;
pub use store::{OpenMode, PageStore};

/// Default page size in bytes (8KB)
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Default number of frames in the buffer pool
pub const DEFAULT_FRAME_COUNT: usize = 128;

/// Page number type
pub type PageNum = u64;
