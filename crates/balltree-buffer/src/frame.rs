//! Frames: fixed-size in-memory buffers that hold one resident page each.

use balltree_common::page::PageId;

/// Index of a frame within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// One page-sized buffer of a pool.
///
/// The frame exclusively owns its page buffer while the page is resident.
pub struct BufferFrame {
    /// Frame identifier.
    frame_id: FrameId,
    /// The page currently stored in this frame.
    page_id: Option<PageId>,
    /// Page data buffer.
    data: Box<[u8]>,
    /// Whether the page has been modified since it was last written.
    is_dirty: bool,
}

impl BufferFrame {
    /// Creates a new empty buffer frame holding `page_size` bytes.
    pub fn new(frame_id: FrameId, page_size: usize) -> Self {
        Self {
            frame_id,
            page_id: None,
            data: vec![0u8; page_size].into_boxed_slice(),
            is_dirty: false,
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Resident page, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    #[inline]
    pub fn set_page_id(&mut self, page_id: Option<PageId>) {
        self.page_id = page_id;
    }

    /// True once the bytes differ from the on-disk page.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Marks this frame as dirty or clean.
    #[inline]
    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    /// True when no page is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id.is_none()
    }

    /// Reads the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrites the start of the buffer with `src`, truncating to the page size.
    #[inline]
    pub fn copy_from(&mut self, src: &[u8]) {
        let len = src.len().min(self.data.len());
        self.data[..len].copy_from_slice(&src[..len]);
    }

    /// Detaches the page and zeroes the buffer.
    #[inline]
    pub fn reset(&mut self) {
        self.page_id = None;
        self.is_dirty = false;
        self.data.fill(0);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id)
            .field("page_size", &self.data.len())
            .field("is_dirty", &self.is_dirty)
            .finish()
    }
}
