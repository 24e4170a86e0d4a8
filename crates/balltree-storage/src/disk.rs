//! Page file for page-level file I/O.

use balltree_common::page::PageId;
use balltree_common::{BallTreeError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A flat file of fixed-size pages.
///
/// Page `i` occupies bytes `[i * page_size, (i + 1) * page_size)`. Each
/// storage kind owns exactly one page file.
pub struct PageFile {
    /// The file handle.
    file: File,
    /// Path to the file.
    path: PathBuf,
    /// Size of every page in bytes.
    page_size: usize,
    /// Number of pages in the file.
    num_pages: u32,
    /// Enable fsync on sync().
    fsync_enabled: bool,
}

impl PageFile {
    /// Creates a new, empty page file, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, page_size: usize, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            page_size,
            num_pages: 0,
            fsync_enabled,
        })
    }

    /// Opens an existing page file.
    ///
    /// Fails with `IndexFileMissing` if the file does not exist.
    pub fn open(path: impl AsRef<Path>, page_size: usize, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(BallTreeError::IndexFileMissing(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_size = file.metadata()?.len();
        let num_pages = (file_size / page_size as u64) as u32;

        Ok(Self {
            file,
            path,
            page_size,
            num_pages,
            fsync_enabled,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages written to the file.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Reads a page from disk into `buf`, which must be one page long.
    pub fn read_page_into(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        if page_id.0 >= self.num_pages {
            return Err(BallTreeError::Corrupted(format!(
                "page {} does not exist in {}",
                page_id,
                self.path.display()
            )));
        }
        debug_assert_eq!(buf.len(), self.page_size);

        self.file
            .seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Reads a page from disk.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Box<[u8]>> {
        let mut buf = vec![0u8; self.page_size].into_boxed_slice();
        self.read_page_into(page_id, &mut buf)?;
        Ok(buf)
    }

    /// Writes a page to disk, extending the file if needed.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.page_size);

        self.file
            .seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        self.file.write_all(data)?;

        // Update page count if we extended the file
        if page_id.0 >= self.num_pages {
            self.num_pages = page_id.0 + 1;
        }

        Ok(())
    }

    /// Flushes pending writes, calling fsync when enabled.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for PageFile {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

impl std::fmt::Debug for PageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("num_pages", &self.num_pages)
            .finish()
    }
}
