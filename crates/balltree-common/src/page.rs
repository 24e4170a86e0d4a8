//! Page and locator identifiers for ball-tree storage.

use crate::error::{BallTreeError, Result};

/// Page size granularity in bytes (1 KB). Page sizes are rounded up to it.
pub const PAGE_SIZE_ALIGN: usize = 1024;

/// Page number within a single storage file (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u32);

impl PageId {
    /// Byte offset of this page in a file of `page_size`-byte pages.
    pub fn offset(&self, page_size: usize) -> u64 {
        self.0 as u64 * page_size as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of object stored in a slot. Each kind lives in its own storage file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    /// A data record (vector plus identifier).
    Record = 0,
    /// An interior ball-tree node.
    Branch = 1,
    /// A ball-tree leaf.
    Leaf = 2,
}

impl NodeKind {
    /// All kinds, in tag order.
    pub const ALL: [NodeKind; 3] = [NodeKind::Record, NodeKind::Branch, NodeKind::Leaf];

    /// Lowercase name, also used as the stem of the kind's files.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Record => "record",
            NodeKind::Branch => "branch",
            NodeKind::Leaf => "leaf",
        }
    }
}

impl TryFrom<u8> for NodeKind {
    type Error = BallTreeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(NodeKind::Record),
            1 => Ok(NodeKind::Branch),
            2 => Ok(NodeKind::Leaf),
            _ => Err(BallTreeError::Corrupted(format!(
                "invalid node kind tag: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to a persisted record or node.
///
/// A locator is a plain value: it names a page, a slot within that page,
/// and the kind of object stored there. It is resolved only through the
/// storage engine and never implies ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    /// Page within the kind's storage file.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot_id: u32,
    /// Kind of the stored object.
    pub kind: NodeKind,
}

impl Locator {
    /// Encoded size in bytes.
    ///
    /// Layout (9 bytes):
    /// - page_id: 4 bytes
    /// - slot_id: 4 bytes
    /// - kind: 1 byte
    pub const SIZE: usize = 9;

    /// Creates a new locator.
    pub fn new(page_id: PageId, slot_id: u32, kind: NodeKind) -> Self {
        Self {
            page_id,
            slot_id,
            kind,
        }
    }

    /// Serializes the locator to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot_id.to_le_bytes());
        buf[8] = self.kind as u8;
        buf
    }

    /// Deserializes a locator from bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(BallTreeError::Corrupted(format!(
                "locator needs {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }
        let page_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let slot_id = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let kind = NodeKind::try_from(buf[8])?;
        Ok(Self::new(PageId(page_id), slot_id, kind))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.kind, self.page_id, self.slot_id)
    }
}

/// Rounds a byte count up to the next page size boundary.
///
/// Returns None if the result does not fit in `usize`.
pub fn align_page_size(bytes: usize) -> Option<usize> {
    bytes.checked_next_multiple_of(PAGE_SIZE_ALIGN)
}
