//! Fixed-length slot page format.
//!
//! Page layout:
//! ```text
//! +--------------------------+
//! | Slot 0                   |
//! | Slot 1                   |
//! | ...                      |
//! | Slot capacity-1          |
//! +--------------------------+
//! | (unused)                 |
//! +--------------------------+
//! | Occupancy bitmap         |  capacity / 8 + 1 bytes
//! | Kind tag (1)             |
//! | Slot size (8)            |  <- last byte of page
//! +--------------------------+
//! ```
//!
//! Bit `i` of the bitmap is bit `i % 8` of byte `i / 8` and is set iff
//! slot `i` holds live data.

use balltree_common::page::{NodeKind, align_page_size};
use balltree_common::{BallTreeError, Result};

/// Geometry of a slot page for one storage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Kind of object stored in the page.
    kind: NodeKind,
    /// Size of one slot in bytes.
    slot_size: usize,
    /// Total page size in bytes.
    page_size: usize,
    /// Number of slots in a page.
    capacity: usize,
    /// Length of the occupancy bitmap in bytes.
    bitmap_len: usize,
}

impl PageLayout {
    /// Size of the fixed tail after the bitmap (kind tag + slot size).
    pub const TAIL_SIZE: usize = 1 + 8;

    /// Creates a layout whose pages hold at least `slots_per_page` slots.
    ///
    /// The page size is rounded up to a 1 KB boundary, so the actual
    /// capacity is usually larger.
    pub fn new(kind: NodeKind, slot_size: usize, slots_per_page: usize) -> Result<Self> {
        if slots_per_page == 0 {
            return Err(BallTreeError::InvalidConfig {
                name: "slots_per_page".to_string(),
                value: slots_per_page.to_string(),
            });
        }
        // One spare byte matches the rounding in the capacity formula.
        let needed = slots_per_page
            .checked_mul(slot_size)
            .and_then(|n| n.checked_add(slots_per_page.div_ceil(8) + 1 + Self::TAIL_SIZE))
            .and_then(align_page_size)
            .ok_or_else(|| BallTreeError::InvalidConfig {
                name: "slots_per_page".to_string(),
                value: slots_per_page.to_string(),
            })?;
        Self::with_page_size(kind, slot_size, needed)
    }

    /// Creates a layout for an existing page size.
    pub fn with_page_size(kind: NodeKind, slot_size: usize, page_size: usize) -> Result<Self> {
        if slot_size == 0 {
            return Err(BallTreeError::InvalidConfig {
                name: "slot_size".to_string(),
                value: slot_size.to_string(),
            });
        }
        if page_size <= Self::TAIL_SIZE + 1 {
            return Err(BallTreeError::InvalidConfig {
                name: "page_size".to_string(),
                value: page_size.to_string(),
            });
        }

        let capacity = (page_size - Self::TAIL_SIZE - 1) * 8 / (slot_size * 8 + 1);
        if capacity == 0 {
            return Err(BallTreeError::SlotOverflow {
                size: slot_size,
                max: page_size - Self::TAIL_SIZE - 2,
            });
        }

        Ok(Self {
            kind,
            slot_size,
            page_size,
            capacity,
            bitmap_len: capacity / 8 + 1,
        })
    }

    /// Returns the kind stored in pages of this layout.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the slot size in bytes.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Returns the page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of slots per page.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the bitmap length in bytes.
    #[inline]
    pub fn bitmap_len(&self) -> usize {
        self.bitmap_len
    }

    #[inline]
    fn kind_offset(&self) -> usize {
        self.page_size - 9
    }

    #[inline]
    fn bitmap_offset(&self) -> usize {
        self.kind_offset() - self.bitmap_len
    }

    #[inline]
    fn slot_range(&self, slot_id: usize) -> std::ops::Range<usize> {
        let start = slot_id * self.slot_size;
        start..start + self.slot_size
    }
}

/// Static in-slice operations on slot pages held in buffer frames.
pub struct SlotPage;

impl SlotPage {
    /// Formats an empty page: clears the bitmap and writes the tail.
    pub fn init_in_slice(data: &mut [u8], layout: &PageLayout) {
        data.fill(0);
        let kind_offset = layout.kind_offset();
        data[kind_offset] = layout.kind() as u8;
        data[kind_offset + 1..kind_offset + 9]
            .copy_from_slice(&(layout.slot_size() as u64).to_le_bytes());
    }

    /// Reads the kind tag from the page tail.
    pub fn kind_from_slice(data: &[u8]) -> Result<NodeKind> {
        NodeKind::try_from(data[data.len() - 9])
    }

    /// Reads the slot size from the page tail.
    pub fn slot_size_from_slice(data: &[u8]) -> u64 {
        let len = data.len();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&data[len - 8..]);
        u64::from_le_bytes(buf)
    }

    /// Checks that a page read from disk belongs to this layout.
    pub fn validate_in_slice(data: &[u8], layout: &PageLayout) -> Result<()> {
        let kind = Self::kind_from_slice(data)?;
        if kind != layout.kind() {
            return Err(BallTreeError::SlotKindMismatch {
                expected: layout.kind(),
                actual: kind,
            });
        }
        let slot_size = Self::slot_size_from_slice(data);
        if slot_size != layout.slot_size() as u64 {
            return Err(BallTreeError::Corrupted(format!(
                "{} page slot size {} does not match storage slot size {}",
                kind,
                slot_size,
                layout.slot_size()
            )));
        }
        Ok(())
    }

    /// Returns true if the slot's occupancy bit is set.
    #[inline]
    pub fn is_occupied_in_slice(data: &[u8], layout: &PageLayout, slot_id: usize) -> bool {
        if slot_id >= layout.capacity() {
            return false;
        }
        let byte = data[layout.bitmap_offset() + slot_id / 8];
        byte & (1 << (slot_id % 8)) != 0
    }

    #[inline]
    fn set_occupied_in_slice(data: &mut [u8], layout: &PageLayout, slot_id: usize) {
        data[layout.bitmap_offset() + slot_id / 8] |= 1 << (slot_id % 8);
    }

    /// Number of occupied slots.
    pub fn used_in_slice(data: &[u8], layout: &PageLayout) -> usize {
        let start = layout.bitmap_offset();
        data[start..start + layout.bitmap_len()]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum()
    }

    /// Returns the lowest free slot, if any.
    pub fn first_free_in_slice(data: &[u8], layout: &PageLayout) -> Option<usize> {
        (0..layout.capacity()).find(|&i| !Self::is_occupied_in_slice(data, layout, i))
    }

    /// Returns true if the page has room for another slot.
    #[inline]
    pub fn has_free_slot_in_slice(data: &[u8], layout: &PageLayout) -> bool {
        Self::used_in_slice(data, layout) < layout.capacity()
    }

    /// Writes `bytes` into the lowest free slot and marks it occupied.
    ///
    /// Returns the slot id, or None if the page is full.
    pub fn insert_in_slice(data: &mut [u8], layout: &PageLayout, bytes: &[u8]) -> Option<usize> {
        debug_assert!(bytes.len() <= layout.slot_size());
        let slot_id = Self::first_free_in_slice(data, layout)?;

        let range = layout.slot_range(slot_id);
        let slot = &mut data[range];
        slot[..bytes.len()].copy_from_slice(bytes);
        slot[bytes.len()..].fill(0);

        Self::set_occupied_in_slice(data, layout, slot_id);
        Some(slot_id)
    }

    /// Returns the bytes of an occupied slot.
    pub fn slot_in_slice<'a>(data: &'a [u8], layout: &PageLayout, slot_id: usize) -> Option<&'a [u8]> {
        if !Self::is_occupied_in_slice(data, layout, slot_id) {
            return None;
        }
        Some(&data[layout.slot_range(slot_id)])
    }
}
