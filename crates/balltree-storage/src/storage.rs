//! Fixed-length slot storage over a buffer-pooled page file.

use crate::disk::PageFile;
use crate::meta::KindIndexFile;
use crate::page::{PageLayout, SlotPage};
use crate::slot::SlotCodec;
use balltree_buffer::{BufferPool, BufferPoolConfig};
use balltree_common::page::{Locator, NodeKind, PageId};
use balltree_common::{BallTreeError, Result, StorageConfig};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Path of a kind's page file inside an index directory.
pub fn pages_path(dir: &Path, kind: NodeKind) -> PathBuf {
    dir.join(format!("{}.pages", kind.name()))
}

/// Path of a kind's index file inside an index directory.
pub fn index_path(dir: &Path, kind: NodeKind) -> PathBuf {
    dir.join(format!("{}.idx", kind.name()))
}

/// Storage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Kind served by the storage.
    pub kind: NodeKind,
    /// Pages allocated in the storage.
    pub page_count: u32,
    /// Pages currently resident in the buffer pool.
    pub resident_pages: usize,
    /// Resident pages not yet written back.
    pub dirty_pages: usize,
    /// Slot reads served from a resident page.
    pub hits: u64,
    /// Slot reads that had to read the page from disk.
    pub misses: u64,
    /// Pages evicted from the buffer pool.
    pub evictions: u64,
    /// Pages written to disk.
    pub flushes: u64,
}

/// State guarded by the storage lock.
struct StorageInner {
    pool: BufferPool,
    file: PageFile,
    page_count: u32,
    hits: u64,
    misses: u64,
    flushes: u64,
}

impl StorageInner {
    /// Makes a page resident, reading it from disk on a miss.
    fn page_in(&mut self, page_id: PageId, layout: &PageLayout) -> Result<()> {
        if self.pool.contains(page_id) {
            self.hits += 1;
            return Ok(());
        }
        self.misses += 1;

        let data = self.file.read_page(page_id)?;
        SlotPage::validate_in_slice(&data, layout)?;

        let StorageInner {
            pool,
            file,
            flushes,
            ..
        } = &mut *self;
        pool.load_page(page_id, &data, |victim, bytes| {
            write_back(file, flushes, victim, bytes)
        })?;
        Ok(())
    }

    /// Allocates and formats a fresh page.
    ///
    /// `page_count` only grows once the page holds a frame, so a failed
    /// write-back leaves the storage as it was.
    fn allocate_page(&mut self, layout: &PageLayout) -> Result<PageId> {
        let page_id = PageId(self.page_count);

        let StorageInner {
            pool,
            file,
            flushes,
            ..
        } = &mut *self;
        let frame = pool.new_page(page_id, |victim, bytes| {
            write_back(file, flushes, victim, bytes)
        })?;
        SlotPage::init_in_slice(frame.data_mut(), layout);
        pool.mark_dirty(page_id);

        self.page_count += 1;
        debug!(kind = %layout.kind(), page_id = page_id.0, "allocated page");
        Ok(page_id)
    }
}

/// Writes a dirty page pushed out of the pool.
fn write_back(file: &mut PageFile, flushes: &mut u64, page_id: PageId, data: &[u8]) -> Result<()> {
    debug!(page_id = page_id.0, "writing evicted page");
    file.write_page(page_id, data)?;
    *flushes += 1;
    Ok(())
}

/// Storage of fixed-length slots for one object kind.
///
/// Values are addressed by [`Locator`]. Pages are cached in a fixed-size
/// buffer pool with clock eviction; dirty pages reach disk when evicted,
/// on [`SlotStorage::flush`], or when the storage is dropped.
pub struct SlotStorage {
    layout: PageLayout,
    index_path: PathBuf,
    fsync_enabled: bool,
    inner: Mutex<StorageInner>,
}

impl SlotStorage {
    /// Creates an empty storage in `dir`, replacing any existing files of
    /// the same kind.
    pub fn create(
        dir: &Path,
        kind: NodeKind,
        slot_size: usize,
        config: &StorageConfig,
    ) -> Result<Self> {
        config.validate()?;
        let layout = PageLayout::new(kind, slot_size, config.slots_per_page)?;
        let file = PageFile::create(
            pages_path(dir, kind),
            layout.page_size(),
            config.fsync_enabled,
        )?;

        debug!(
            %kind,
            slot_size,
            page_size = layout.page_size(),
            capacity = layout.capacity(),
            "created slot storage"
        );

        let storage = Self::with_parts(dir, layout, file, 0, config);
        storage.write_index_file()?;
        Ok(storage)
    }

    /// Opens the storage for `kind` in `dir`.
    ///
    /// The page geometry comes from the kind's index file, so `config` only
    /// supplies buffer pool and sync settings.
    pub fn open(dir: &Path, kind: NodeKind, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let meta = KindIndexFile::read(&index_path(dir, kind))?;
        if meta.kind != kind {
            return Err(BallTreeError::SlotKindMismatch {
                expected: kind,
                actual: meta.kind,
            });
        }

        let layout =
            PageLayout::with_page_size(kind, meta.slot_size as usize, meta.page_size as usize)?;
        let file = PageFile::open(
            pages_path(dir, kind),
            layout.page_size(),
            config.fsync_enabled,
        )?;
        if file.num_pages() < meta.page_count {
            return Err(BallTreeError::Corrupted(format!(
                "{} holds {} pages, index file expects {}",
                file.path().display(),
                file.num_pages(),
                meta.page_count
            )));
        }

        debug!(%kind, page_count = meta.page_count, "opened slot storage");
        Ok(Self::with_parts(dir, layout, file, meta.page_count, config))
    }

    fn with_parts(
        dir: &Path,
        layout: PageLayout,
        file: PageFile,
        page_count: u32,
        config: &StorageConfig,
    ) -> Self {
        let pool = BufferPool::new(BufferPoolConfig {
            num_frames: config.max_frames_per_kind,
            page_size: layout.page_size(),
        });

        Self {
            layout,
            index_path: index_path(dir, layout.kind()),
            fsync_enabled: config.fsync_enabled,
            inner: Mutex::new(StorageInner {
                pool,
                file,
                page_count,
                hits: 0,
                misses: 0,
                flushes: 0,
            }),
        }
    }

    /// Returns the kind stored here.
    pub fn kind(&self) -> NodeKind {
        self.layout.kind()
    }

    /// Returns the slot size in bytes.
    pub fn slot_size(&self) -> usize {
        self.layout.slot_size()
    }

    /// Returns the page geometry.
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Returns the number of allocated pages.
    pub fn page_count(&self) -> u32 {
        self.inner.lock().page_count
    }

    /// Stores `bytes` in a free slot and returns its locator.
    ///
    /// Resident pages with room are filled first, then a fresh page is
    /// allocated. Fails with `SlotOverflow` if `bytes` exceeds the slot size.
    pub fn put(&self, bytes: &[u8]) -> Result<Locator> {
        if bytes.len() > self.layout.slot_size() {
            return Err(BallTreeError::SlotOverflow {
                size: bytes.len(),
                max: self.layout.slot_size(),
            });
        }

        let layout = &self.layout;
        let mut inner = self.inner.lock();

        let resident = inner
            .pool
            .find_page(|frame| SlotPage::has_free_slot_in_slice(frame.data(), layout));
        let page_id = match resident {
            Some(page_id) => page_id,
            None => inner.allocate_page(layout)?,
        };

        let frame = inner
            .pool
            .fetch_page(page_id)
            .ok_or_else(|| BallTreeError::Corrupted(format!("page {} not resident", page_id)))?;
        let slot_id = SlotPage::insert_in_slice(frame.data_mut(), layout, bytes).ok_or_else(
            || BallTreeError::Corrupted(format!("page {} has no free slot", page_id)),
        )?;
        inner.pool.mark_dirty(page_id);

        Ok(Locator::new(page_id, slot_id as u32, layout.kind()))
    }

    /// Returns a copy of the slot named by `locator`.
    ///
    /// The returned buffer is always `slot_size` bytes long.
    pub fn get(&self, locator: Locator) -> Result<Vec<u8>> {
        let layout = &self.layout;
        if locator.kind != layout.kind() {
            return Err(BallTreeError::SlotKindMismatch {
                expected: layout.kind(),
                actual: locator.kind,
            });
        }

        let mut inner = self.inner.lock();
        if locator.page_id.0 >= inner.page_count || locator.slot_id as usize >= layout.capacity() {
            return Err(BallTreeError::SlotNotFound(locator));
        }

        inner.page_in(locator.page_id, layout)?;
        let frame = inner
            .pool
            .fetch_page(locator.page_id)
            .ok_or(BallTreeError::SlotNotFound(locator))?;

        SlotPage::slot_in_slice(frame.data(), layout, locator.slot_id as usize)
            .map(<[u8]>::to_vec)
            .ok_or(BallTreeError::SlotNotFound(locator))
    }

    /// Encodes and stores a value.
    pub fn put_value<T: SlotCodec>(&self, value: &T) -> Result<Locator> {
        self.check_codec_kind(T::KIND)?;
        let bytes = value.to_slot(self.layout.slot_size())?;
        self.put(&bytes)
    }

    /// Reads and decodes a value.
    pub fn get_value<T: SlotCodec>(&self, locator: Locator) -> Result<T> {
        self.check_codec_kind(T::KIND)?;
        T::decode(&self.get(locator)?)
    }

    fn check_codec_kind(&self, kind: NodeKind) -> Result<()> {
        if kind != self.layout.kind() {
            return Err(BallTreeError::SlotKindMismatch {
                expected: self.layout.kind(),
                actual: kind,
            });
        }
        Ok(())
    }

    /// Writes every dirty page and the index file to disk.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let StorageInner { pool, file, .. } = &mut *inner;

        let flushed = pool.flush_all(|page_id, data| file.write_page(page_id, data))?;
        file.sync()?;
        inner.flushes += flushed as u64;

        let page_count = inner.page_count;
        drop(inner);

        self.write_index_file_with(page_count)?;
        debug!(kind = %self.kind(), pages = flushed, "flushed slot storage");
        Ok(())
    }

    fn write_index_file(&self) -> Result<()> {
        let page_count = self.inner.lock().page_count;
        self.write_index_file_with(page_count)
    }

    fn write_index_file_with(&self, page_count: u32) -> Result<()> {
        let meta = KindIndexFile {
            kind: self.layout.kind(),
            slot_size: self.layout.slot_size() as u64,
            page_size: self.layout.page_size() as u64,
            page_count,
        };
        meta.write(&self.index_path)?;
        if self.fsync_enabled {
            std::fs::File::open(&self.index_path)?.sync_all()?;
        }
        Ok(())
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        let inner = self.inner.lock();
        let pool = inner.pool.stats();
        StorageStats {
            kind: self.layout.kind(),
            page_count: inner.page_count,
            resident_pages: pool.used_frames,
            dirty_pages: pool.dirty_frames,
            hits: inner.hits,
            misses: inner.misses,
            evictions: pool.evictions,
            flushes: inner.flushes,
        }
    }
}

impl Drop for SlotStorage {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(kind = %self.kind(), error = %e, "failed to flush slot storage on drop");
        }
    }
}

impl std::fmt::Debug for SlotStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStorage")
            .field("layout", &self.layout)
            .field("index_path", &self.index_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::record_slot_size;
    use balltree_common::Record;
    use tempfile::tempdir;

    fn config(frames: usize) -> StorageConfig {
        StorageConfig {
            max_frames_per_kind: frames,
            slots_per_page: 8,
            fsync_enabled: false,
        }
    }

    fn record(i: i32) -> Record {
        Record::new(i, vec![i as f32, -(i as f32), 0.5, 1.0 / (i as f32 + 1.0)])
    }

    #[test]
    fn test_put_get_bytes() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(4)).unwrap();

        let a = storage.put(&[1, 2, 3]).unwrap();
        let b = storage.put(&[4, 5, 6]).unwrap();
        assert_eq!(a, Locator::new(PageId(0), 0, NodeKind::Record));
        assert_eq!(b, Locator::new(PageId(0), 1, NodeKind::Record));

        let slot = storage.get(b).unwrap();
        assert_eq!(slot.len(), 28);
        assert_eq!(&slot[..3], &[4, 5, 6]);
        assert_eq!(storage.page_count(), 1);
    }

    #[test]
    fn test_put_overflow() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Record, 8, &config(4)).unwrap();
        assert!(matches!(
            storage.put(&[0u8; 9]),
            Err(BallTreeError::SlotOverflow { size: 9, max: 8 })
        ));
        assert_eq!(storage.page_count(), 0);
    }

    #[test]
    fn test_get_kind_mismatch() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Leaf, 64, &config(4)).unwrap();
        let locator = storage.put(&[1]).unwrap();

        let wrong = Locator::new(locator.page_id, locator.slot_id, NodeKind::Branch);
        assert!(matches!(
            storage.get(wrong),
            Err(BallTreeError::SlotKindMismatch {
                expected: NodeKind::Leaf,
                actual: NodeKind::Branch,
            })
        ));

        // Decoding a record out of leaf storage is refused before any I/O
        assert!(matches!(
            storage.get_value::<Record>(locator),
            Err(BallTreeError::SlotKindMismatch { .. })
        ));
    }

    #[test]
    fn test_get_slot_not_found() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(4)).unwrap();
        storage.put(&[1]).unwrap();

        // Unset occupancy bit
        let empty = Locator::new(PageId(0), 5, NodeKind::Record);
        assert!(matches!(
            storage.get(empty),
            Err(BallTreeError::SlotNotFound(l)) if l == empty
        ));

        // Page beyond page_count
        let beyond = Locator::new(PageId(3), 0, NodeKind::Record);
        assert!(matches!(
            storage.get(beyond),
            Err(BallTreeError::SlotNotFound(_))
        ));

        // Slot beyond capacity
        let huge = Locator::new(PageId(0), u32::MAX, NodeKind::Record);
        assert!(matches!(
            storage.get(huge),
            Err(BallTreeError::SlotNotFound(_))
        ));
    }

    #[test]
    fn test_pages_fill_in_order() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(4)).unwrap();
        let capacity = storage.layout().capacity();

        let locators: Vec<_> = (0..capacity + 1)
            .map(|i| storage.put(&[i as u8]).unwrap())
            .collect();

        assert_eq!(locators[capacity - 1].page_id, PageId(0));
        assert_eq!(locators[capacity - 1].slot_id as usize, capacity - 1);
        assert_eq!(locators[capacity], Locator::new(PageId(1), 0, NodeKind::Record));
        assert_eq!(storage.page_count(), 2);
    }

    #[test]
    fn test_buffer_pool_under_pressure() {
        let dir = tempdir().unwrap();
        let storage =
            SlotStorage::create(dir.path(), NodeKind::Record, record_slot_size(4), &config(2))
                .unwrap();
        let capacity = storage.layout().capacity();

        // Enough records for many more pages than frames
        let n = capacity * 7 + 3;
        let locators: Vec<_> = (0..n as i32)
            .map(|i| storage.put_value(&record(i)).unwrap())
            .collect();
        assert_eq!(storage.page_count(), 8);

        let stats = storage.stats();
        assert_eq!(stats.resident_pages, 2);
        assert!(stats.evictions >= 6);
        assert!(stats.flushes >= 6);

        // Every get returns what was put, in any order
        for (i, locator) in locators.iter().enumerate().rev() {
            let got: Record = storage.get_value(*locator).unwrap();
            assert_eq!(got, record(i as i32));
        }
        for (i, locator) in locators.iter().enumerate().step_by(5) {
            let got: Record = storage.get_value(*locator).unwrap();
            assert_eq!(got, record(i as i32));
        }

        let stats = storage.stats();
        assert!(stats.misses > 0);
        assert!(stats.hits > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_back_keeps_dirty_page() {
        // Every write to /dev/full fails with ENOSPC
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(full, pages_path(dir.path(), NodeKind::Record)).unwrap();

        let storage = SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(1)).unwrap();
        let capacity = storage.layout().capacity();
        let locators: Vec<_> = (0..capacity)
            .map(|i| storage.put(&[i as u8 + 1]).unwrap())
            .collect();

        // The next put needs a second page, so page 0 must be written first
        assert!(matches!(storage.put(&[0xFF]), Err(BallTreeError::Io(_))));
        assert_eq!(storage.page_count(), 1);

        let stats = storage.stats();
        assert_eq!(stats.resident_pages, 1);
        assert_eq!(stats.dirty_pages, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.flushes, 0);

        for (i, locator) in locators.iter().enumerate() {
            assert_eq!(storage.get(*locator).unwrap()[0], i as u8 + 1);
        }
    }

    #[test]
    fn test_reopen_after_drop() {
        let dir = tempdir().unwrap();
        let locators: Vec<_>;
        {
            let storage =
                SlotStorage::create(dir.path(), NodeKind::Record, record_slot_size(4), &config(2))
                    .unwrap();
            locators = (0..100).map(|i| storage.put_value(&record(i)).unwrap()).collect();
        }

        let storage = SlotStorage::open(dir.path(), NodeKind::Record, &config(1)).unwrap();
        assert_eq!(storage.slot_size(), record_slot_size(4));
        for (i, locator) in locators.iter().enumerate() {
            let got: Record = storage.get_value(*locator).unwrap();
            assert_eq!(got.index, i as i32);
        }
    }

    #[test]
    fn test_flush_writes_index_file() {
        let dir = tempdir().unwrap();
        let storage = SlotStorage::create(dir.path(), NodeKind::Branch, 50, &config(4)).unwrap();
        storage.put(&[1]).unwrap();
        storage.flush().unwrap();

        let meta = KindIndexFile::read(&index_path(dir.path(), NodeKind::Branch)).unwrap();
        assert_eq!(meta.kind, NodeKind::Branch);
        assert_eq!(meta.slot_size, 50);
        assert_eq!(meta.page_size, storage.layout().page_size() as u64);
        assert_eq!(meta.page_count, 1);

        let stats = storage.stats();
        assert_eq!(stats.dirty_pages, 0);
        assert_eq!(stats.flushes, 1);

        let file_len = std::fs::metadata(pages_path(dir.path(), NodeKind::Branch))
            .unwrap()
            .len();
        assert_eq!(file_len, storage.layout().page_size() as u64);
    }

    #[test]
    fn test_open_missing_index_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SlotStorage::open(dir.path(), NodeKind::Leaf, &config(2)),
            Err(BallTreeError::IndexFileMissing(_))
        ));
    }

    #[test]
    fn test_open_truncated_page_file() {
        let dir = tempdir().unwrap();
        {
            let storage =
                SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(2)).unwrap();
            storage.put(&[1]).unwrap();
        }
        std::fs::write(pages_path(dir.path(), NodeKind::Record), b"").unwrap();

        assert!(matches!(
            SlotStorage::open(dir.path(), NodeKind::Record, &config(2)),
            Err(BallTreeError::Corrupted(_))
        ));
    }

    #[test]
    fn test_open_detects_foreign_page() {
        let dir = tempdir().unwrap();
        {
            let storage = SlotStorage::create(dir.path(), NodeKind::Leaf, 28, &config(2)).unwrap();
            storage.put(&[1]).unwrap();
        }
        // Swap in a record page file with the same geometry
        {
            let other = tempdir().unwrap();
            let storage =
                SlotStorage::create(other.path(), NodeKind::Record, 28, &config(2)).unwrap();
            storage.put(&[1]).unwrap();
            storage.flush().unwrap();
            std::fs::copy(
                pages_path(other.path(), NodeKind::Record),
                pages_path(dir.path(), NodeKind::Leaf),
            )
            .unwrap();
        }

        let storage = SlotStorage::open(dir.path(), NodeKind::Leaf, &config(2)).unwrap();
        assert!(matches!(
            storage.get(Locator::new(PageId(0), 0, NodeKind::Leaf)),
            Err(BallTreeError::SlotKindMismatch {
                expected: NodeKind::Leaf,
                actual: NodeKind::Record,
            })
        ));
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SlotStorage::create(dir.path(), NodeKind::Record, 28, &config(0)),
            Err(BallTreeError::InvalidConfig { .. })
        ));
    }
}
