//! Slot codec for records and persisted tree nodes.
//!
//! All integers and floats are little-endian. Layouts:
//!
//! ```text
//! Record: [i32 index][u64 len][f32 x len]
//! Branch: [u64 center_len][f32 x center_len][f64 radius][Locator left][Locator right]
//! Leaf:   [u64 center_len][f32 x center_len][f64 radius][u64 count][Locator x count]
//! ```

use balltree_common::page::{Locator, NodeKind};
use balltree_common::{BallTreeError, Record, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Slot size of a record of the given dimension.
pub const fn record_slot_size(dimension: usize) -> usize {
    4 + 8 + 4 * dimension
}

/// Slot size of a persisted branch of the given dimension.
pub const fn branch_slot_size(dimension: usize) -> usize {
    8 + 4 * dimension + 8 + 2 * Locator::SIZE
}

/// Slot size of a persisted leaf of the given dimension holding up to
/// `leaf_size` records.
pub const fn leaf_slot_size(dimension: usize, leaf_size: usize) -> usize {
    8 + 4 * dimension + 8 + 8 + Locator::SIZE * leaf_size
}

/// Slot sizes of every storage kind for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSizes {
    pub record: usize,
    pub branch: usize,
    pub leaf: usize,
}

impl SlotSizes {
    pub fn new(dimension: usize, leaf_size: usize) -> Self {
        Self {
            record: record_slot_size(dimension),
            branch: branch_slot_size(dimension),
            leaf: leaf_slot_size(dimension, leaf_size),
        }
    }

    pub fn for_kind(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Record => self.record,
            NodeKind::Branch => self.branch,
            NodeKind::Leaf => self.leaf,
        }
    }
}

/// A ball-tree interior node as persisted, with children linked by locator.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBranch {
    pub center: Vec<f32>,
    pub radius: f64,
    pub left: Locator,
    pub right: Locator,
}

/// A ball-tree leaf as persisted, with records linked by locator.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLeaf {
    pub center: Vec<f32>,
    pub radius: f64,
    pub records: Vec<Locator>,
}

/// A persisted tree node of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredNode {
    Branch(StoredBranch),
    Leaf(StoredLeaf),
}

impl StoredNode {
    /// Returns the node's center.
    pub fn center(&self) -> &[f32] {
        match self {
            StoredNode::Branch(b) => &b.center,
            StoredNode::Leaf(l) => &l.center,
        }
    }

    /// Returns the node's radius.
    pub fn radius(&self) -> f64 {
        match self {
            StoredNode::Branch(b) => b.radius,
            StoredNode::Leaf(l) => l.radius,
        }
    }
}

/// Binary encoding of a value stored in a fixed-length slot.
pub trait SlotCodec: Sized {
    /// The storage kind this value lives in.
    const KIND: NodeKind;

    /// Exact encoded length in bytes.
    fn encoded_len(&self) -> usize;

    /// Appends the encoding to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Decodes a value from the start of a slot. Trailing bytes are ignored.
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Encodes the value, failing if it does not fit in `slot_size` bytes.
    fn to_slot(&self, slot_size: usize) -> Result<Bytes> {
        let len = self.encoded_len();
        if len > slot_size {
            return Err(BallTreeError::SlotOverflow {
                size: len,
                max: slot_size,
            });
        }
        let mut buf = BytesMut::with_capacity(len);
        self.encode(&mut buf);
        Ok(buf.freeze())
    }
}

fn truncated(kind: NodeKind, what: &str) -> BallTreeError {
    BallTreeError::Corrupted(format!("truncated {} slot: {}", kind, what))
}

/// Reads a `u64` length prefix followed by that many `f32`s.
fn get_vector(buf: &mut &[u8], kind: NodeKind) -> Result<Vec<f32>> {
    if buf.remaining() < 8 {
        return Err(truncated(kind, "vector length"));
    }
    let len = buf.get_u64_le();
    if len > (buf.remaining() / 4) as u64 {
        return Err(BallTreeError::Corrupted(format!(
            "{} slot vector length {} exceeds slot",
            kind, len
        )));
    }
    Ok((0..len).map(|_| buf.get_f32_le()).collect())
}

fn put_vector(buf: &mut BytesMut, data: &[f32]) {
    buf.put_u64_le(data.len() as u64);
    for &x in data {
        buf.put_f32_le(x);
    }
}

fn get_locator(buf: &mut &[u8], kind: NodeKind) -> Result<Locator> {
    if buf.remaining() < Locator::SIZE {
        return Err(truncated(kind, "locator"));
    }
    let locator = Locator::from_bytes(&buf[..Locator::SIZE])?;
    buf.advance(Locator::SIZE);
    Ok(locator)
}

impl SlotCodec for Record {
    const KIND: NodeKind = NodeKind::Record;

    fn encoded_len(&self) -> usize {
        record_slot_size(self.data.len())
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.index);
        put_vector(buf, &self.data);
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(truncated(Self::KIND, "index"));
        }
        let index = buf.get_i32_le();
        let data = get_vector(&mut buf, Self::KIND)?;
        Ok(Record { index, data })
    }
}

impl SlotCodec for StoredBranch {
    const KIND: NodeKind = NodeKind::Branch;

    fn encoded_len(&self) -> usize {
        branch_slot_size(self.center.len())
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_vector(buf, &self.center);
        buf.put_f64_le(self.radius);
        buf.put_slice(&self.left.to_bytes());
        buf.put_slice(&self.right.to_bytes());
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        let center = get_vector(&mut buf, Self::KIND)?;
        if buf.remaining() < 8 {
            return Err(truncated(Self::KIND, "radius"));
        }
        let radius = buf.get_f64_le();
        let left = get_locator(&mut buf, Self::KIND)?;
        let right = get_locator(&mut buf, Self::KIND)?;
        Ok(StoredBranch {
            center,
            radius,
            left,
            right,
        })
    }
}

impl SlotCodec for StoredLeaf {
    const KIND: NodeKind = NodeKind::Leaf;

    fn encoded_len(&self) -> usize {
        leaf_slot_size(self.center.len(), self.records.len())
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_vector(buf, &self.center);
        buf.put_f64_le(self.radius);
        buf.put_u64_le(self.records.len() as u64);
        for locator in &self.records {
            buf.put_slice(&locator.to_bytes());
        }
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        let center = get_vector(&mut buf, Self::KIND)?;
        if buf.remaining() < 16 {
            return Err(truncated(Self::KIND, "radius and count"));
        }
        let radius = buf.get_f64_le();
        let count = buf.get_u64_le();
        if count > (buf.remaining() / Locator::SIZE) as u64 {
            return Err(BallTreeError::Corrupted(format!(
                "leaf slot record count {} exceeds slot",
                count
            )));
        }
        let records = (0..count)
            .map(|_| get_locator(&mut buf, Self::KIND))
            .collect::<Result<Vec<_>>>()?;
        Ok(StoredLeaf {
            center,
            radius,
            records,
        })
    }
}
