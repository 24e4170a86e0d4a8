//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::replacer::{ClockReplacer, Replacer};
use balltree_common::page::PageId;
use balltree_common::{BallTreeError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
    /// Size of every page held by the pool, in bytes.
    pub page_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: 64,
            page_size: 4096,
        }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Clock replacement for eviction
///
/// The pool never touches disk. Writes go through a caller-supplied
/// function: a dirty victim is written before its frame is reused, and
/// [`BufferPool::flush_all`] passes every dirty page the same way.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: HashMap<PageId, FrameId>,
    /// List of free frame IDs.
    free_list: Vec<FrameId>,
    /// Page replacement policy.
    replacer: ClockReplacer,
    /// Number of pages evicted so far.
    evictions: u64,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32), config.page_size))
            .collect();

        // All frames start in free list, lowest ID handed out first
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: HashMap::with_capacity(num_frames),
            free_list,
            replacer: ClockReplacer::new(num_frames),
            evictions: 0,
        }
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains_key(&page_id)
    }

    /// Fetches a resident page and sets its reference bit.
    ///
    /// If the page is not in the pool, returns None.
    #[inline]
    pub fn fetch_page(&mut self, page_id: PageId) -> Option<&mut BufferFrame> {
        let frame_id = *self.page_table.get(&page_id)?;
        self.replacer.record_access(frame_id);
        Some(&mut self.frames[frame_id.index()])
    }

    /// Returns the first resident page, in frame order, accepted by `pred`.
    ///
    /// Does not touch reference bits.
    pub fn find_page<F>(&self, mut pred: F) -> Option<PageId>
    where
        F: FnMut(&BufferFrame) -> bool,
    {
        self.frames
            .iter()
            .filter(|frame| !frame.is_empty())
            .find(|frame| pred(frame))
            .and_then(|frame| frame.page_id())
    }

    /// Finds a frame for a new page.
    ///
    /// Takes a free frame if there is one, otherwise evicts the clock
    /// victim. A dirty victim is passed to `write_back` before its frame is
    /// reused. If that write fails the victim stays resident and dirty.
    fn allocate_frame<F>(&mut self, mut write_back: F) -> Result<FrameId>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok(frame_id);
        }

        let victim_id = self.replacer.evict().ok_or(BallTreeError::BufferPoolFull)?;
        let frame = &self.frames[victim_id.index()];

        if let Some(page_id) = frame.page_id() {
            if frame.is_dirty() {
                if let Err(e) = write_back(page_id, frame.data()) {
                    self.replacer.set_evictable(victim_id, true);
                    return Err(e);
                }
            }
            debug!(
                page_id = page_id.0,
                frame = victim_id.0,
                dirty = frame.is_dirty(),
                "evicting page"
            );
            self.page_table.remove(&page_id);
            self.evictions += 1;
        }

        Ok(victim_id)
    }

    /// Installs a new, zeroed page in the pool.
    ///
    /// If the page is already resident its frame is returned unchanged.
    /// `write_back` receives a dirty victim evicted to make room.
    pub fn new_page<F>(&mut self, page_id: PageId, write_back: F) -> Result<&mut BufferFrame>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.replacer.record_access(frame_id);
            return Ok(&mut self.frames[frame_id.index()]);
        }

        let frame_id = self.allocate_frame(write_back)?;

        self.page_table.insert(page_id, frame_id);
        self.replacer.set_evictable(frame_id, true);
        self.replacer.record_access(frame_id);

        let frame = &mut self.frames[frame_id.index()];
        frame.reset();
        frame.set_page_id(Some(page_id));

        Ok(frame)
    }

    /// Installs a page read from disk.
    #[inline]
    pub fn load_page<F>(
        &mut self,
        page_id: PageId,
        data: &[u8],
        write_back: F,
    ) -> Result<&mut BufferFrame>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let frame = self.new_page(page_id, write_back)?;
        frame.copy_from(data);
        Ok(frame)
    }

    /// Marks a resident page as dirty.
    ///
    /// Returns false if the page is not in the pool.
    #[inline]
    pub fn mark_dirty(&mut self, page_id: PageId) -> bool {
        match self.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.frames[frame_id.index()].set_dirty(true);
                true
            }
            None => false,
        }
    }

    /// Flushes all dirty pages in ascending page order.
    ///
    /// Stops at the first failing write. Pages written before the failure
    /// are marked clean. Returns the number of pages flushed.
    pub fn flush_all<F>(&mut self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let mut dirty_pages: Vec<(PageId, FrameId)> = self
            .page_table
            .iter()
            .filter(|(_, frame_id)| self.frames[frame_id.index()].is_dirty())
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect();
        dirty_pages.sort_unstable_by_key(|(page_id, _)| *page_id);

        let mut flushed = 0;
        for (page_id, frame_id) in dirty_pages {
            let frame = &mut self.frames[frame_id.index()];
            flush_fn(page_id, frame.data())?;
            frame.set_dirty(false);
            flushed += 1;
        }

        Ok(flushed)
    }

    /// Returns buffer pool statistics.
    pub fn stats(&self) -> BufferPoolStats {
        let used_frames = self.page_table.len();
        let dirty_frames = self.frames.iter().filter(|f| f.is_dirty()).count();

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_list.len(),
            used_frames,
            dirty_frames,
            evictions: self.evictions,
        }
    }
}

/// Buffer pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
    /// Number of pages evicted since the pool was created.
    pub evictions: u64,
}
