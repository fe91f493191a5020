use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{BufferError, BufferResult};
use crate::PageNum;

/// How the backing file is opened and what happens to it when the pool
/// closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, reads only. Nothing is written back on close.
    ReadOnly,
    /// Read-write, created if missing. Dirty pages are written back on close.
    ReadWrite,
    /// Read-write scratch file, truncated on open and deleted on close.
    Transient,
}

/// A file of fixed-size pages, where page `n` occupies the byte range
/// `[n * page_size, (n + 1) * page_size)`.
pub struct PageStore {
    file: File,
    path: PathBuf,
    mode: OpenMode,
    page_size: usize,
}

impl PageStore {
    /// Opens the backing file according to `mode`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, page_size: usize) -> BufferResult<Self> {
        if page_size == 0 {
            return Err(BufferError::InvalidPageSize(page_size));
        }

        let path = path.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::ReadOnly => OpenOptions::new().read(true).open(&path)?,
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?,
            OpenMode::Transient => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?,
        };

        Ok(Self {
            file,
            path,
            mode,
            page_size,
        })
    }

    /// Reads page `page` into `buf`. A page that is not fully present in the
    /// file (past EOF, or a truncated tail) is an error, not a zero fill.
    pub fn read_page(&mut self, page: PageNum, buf: &mut [u8]) -> BufferResult<()> {
        if buf.len() != self.page_size {
            return Err(BufferError::PageSizeMismatch {
                expected: self.page_size,
                actual: buf.len(),
            });
        }

        let offset = page * self.page_size as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| BufferError::ReadPage { page, source })?;
        self.file
            .read_exact(buf)
            .map_err(|source| BufferError::ReadPage { page, source })?;
        Ok(())
    }

    /// Writes `buf` as page `page`, extending the file if needed.
    pub fn write_page(&mut self, page: PageNum, buf: &[u8]) -> BufferResult<()> {
        if buf.len() != self.page_size {
            return Err(BufferError::PageSizeMismatch {
                expected: self.page_size,
                actual: buf.len(),
            });
        }

        let offset = page * self.page_size as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| BufferError::WritePage { page, source })?;
        self.file
            .write_all(buf)
            .map_err(|source| BufferError::WritePage { page, source })?;
        Ok(())
    }

    /// Flushes file data to disk.
    pub fn sync(&mut self) -> BufferResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Number of pages in the file, counting a partial tail page as one.
    pub fn page_count(&self) -> BufferResult<u64> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64))
    }

    /// Deletes the backing file. The open descriptor stays usable until the
    /// store is dropped.
    pub fn remove_backing(&mut self) -> BufferResult<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
