//! Small metadata files stored next to the page files.

use balltree_common::page::{Locator, NodeKind};
use balltree_common::{BallTreeError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::path::Path;

/// Per-kind index file describing a page file.
///
/// Layout (25 bytes):
/// - kind: 1 byte
/// - slot_size: 8 bytes
/// - page_size: 8 bytes
/// - page_count: 4 bytes
/// - checksum: 4 bytes (CRC32 of the preceding bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindIndexFile {
    pub kind: NodeKind,
    pub slot_size: u64,
    pub page_size: u64,
    pub page_count: u32,
}

impl KindIndexFile {
    /// Encoded size in bytes.
    pub const SIZE: usize = 1 + 8 + 8 + 4 + 4;

    /// Serializes to bytes, appending the checksum.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(self.kind as u8);
        buf.put_u64_le(self.slot_size);
        buf.put_u64_le(self.page_size);
        buf.put_u32_le(self.page_count);

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);
        buf
    }

    /// Deserializes from bytes, verifying the checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(BallTreeError::Corrupted(format!(
                "index file is {} bytes, expected {}",
                data.len(),
                Self::SIZE
            )));
        }

        let computed = crc32fast::hash(&data[..Self::SIZE - 4]);
        let mut buf = data;
        let kind = NodeKind::try_from(buf.get_u8())?;
        let slot_size = buf.get_u64_le();
        let page_size = buf.get_u64_le();
        let page_count = buf.get_u32_le();
        let stored = buf.get_u32_le();

        if stored != computed {
            return Err(BallTreeError::Corrupted(format!(
                "{} index file checksum mismatch: stored={}, computed={}",
                kind, stored, computed
            )));
        }

        Ok(Self {
            kind,
            slot_size,
            page_size,
            page_count,
        })
    }

    /// Writes the index file.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Reads an index file. Fails with `IndexFileMissing` if it does not exist.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BallTreeError::IndexFileMissing(path.display().to_string()));
        }
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// Header file naming the root node of a persisted tree.
///
/// Layout (13 bytes):
/// - root: 9 bytes (Locator)
/// - dimension: 4 bytes (i32)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootHeader {
    pub root: Locator,
    pub dimension: usize,
}

impl RootHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = Locator::SIZE + 4;

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&self.root.to_bytes());
        buf.put_i32_le(self.dimension as i32);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(BallTreeError::Corrupted(format!(
                "root header is {} bytes, expected {}",
                data.len(),
                Self::SIZE
            )));
        }

        let root = Locator::from_bytes(data)?;
        if root.kind == NodeKind::Record {
            return Err(BallTreeError::Corrupted(format!(
                "root locator {} does not name a tree node",
                root
            )));
        }

        let dimension = (&data[Locator::SIZE..]).get_i32_le();
        if dimension <= 0 {
            return Err(BallTreeError::Corrupted(format!(
                "invalid dimension in root header: {}",
                dimension
            )));
        }

        Ok(Self {
            root,
            dimension: dimension as usize,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BallTreeError::IndexFileMissing(path.display().to_string()));
        }
        Self::from_bytes(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balltree_common::page::PageId;
    use tempfile::tempdir;

    fn index_file() -> KindIndexFile {
        KindIndexFile {
            kind: NodeKind::Leaf,
            slot_size: 404,
            page_size: 26624,
            page_count: 3,
        }
    }

    #[test]
    fn test_index_file_layout() {
        let bytes = index_file().to_bytes();
        assert_eq!(bytes.len(), KindIndexFile::SIZE);
        assert_eq!(bytes[0], NodeKind::Leaf as u8);
        assert_eq!(&bytes[1..9], &404u64.to_le_bytes());
        assert_eq!(&bytes[17..21], &3u32.to_le_bytes());
        assert_eq!(&bytes[21..25], &crc32fast::hash(&bytes[..21]).to_le_bytes());

        assert_eq!(KindIndexFile::from_bytes(&bytes).unwrap(), index_file());
    }

    #[test]
    fn test_index_file_checksum_mismatch() {
        let mut bytes = index_file().to_bytes().to_vec();
        bytes[18] ^= 0xFF;
        assert!(matches!(
            KindIndexFile::from_bytes(&bytes),
            Err(BallTreeError::Corrupted(_))
        ));
    }

    #[test]
    fn test_index_file_wrong_length() {
        assert!(KindIndexFile::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_index_file_read_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.idx");
        index_file().write(&path).unwrap();
        assert_eq!(KindIndexFile::read(&path).unwrap(), index_file());

        assert!(matches!(
            KindIndexFile::read(&dir.path().join("record.idx")),
            Err(BallTreeError::IndexFileMissing(_))
        ));
    }

    #[test]
    fn test_root_header_layout() {
        let header = RootHeader {
            root: Locator::new(PageId(1), 4, NodeKind::Branch),
            dimension: 50,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 13);
        assert_eq!(&bytes[9..13], &50i32.to_le_bytes());
        assert_eq!(RootHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_root_header_rejects_record_root() {
        let header = RootHeader {
            root: Locator::new(PageId(0), 0, NodeKind::Record),
            dimension: 4,
        };
        assert!(matches!(
            RootHeader::from_bytes(&header.to_bytes()),
            Err(BallTreeError::Corrupted(_))
        ));
    }

    #[test]
    fn test_root_header_rejects_bad_dimension() {
        let mut bytes = RootHeader {
            root: Locator::new(PageId(0), 0, NodeKind::Leaf),
            dimension: 4,
        }
        .to_bytes()
        .to_vec();
        bytes[9..13].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(RootHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_root_header_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            RootHeader::read(&dir.path().join("root")),
            Err(BallTreeError::IndexFileMissing(_))
        ));
    }
}
