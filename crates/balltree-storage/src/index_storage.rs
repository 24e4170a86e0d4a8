//! The set of storages backing one persisted ball tree.

use crate::meta::RootHeader;
use crate::slot::{SlotSizes, StoredBranch, StoredLeaf, StoredNode, leaf_slot_size};
use crate::storage::{SlotStorage, StorageStats};
use balltree_common::page::{Locator, NodeKind};
use balltree_common::{BallTreeError, Record, Result, StorageConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the root header inside an index directory.
pub const ROOT_FILE: &str = "root";

/// Record, branch and leaf storages of one index directory.
///
/// Directory contents:
/// - `root`: root locator and dimension
/// - `{record,branch,leaf}.pages`: page files
/// - `{record,branch,leaf}.idx`: per-kind page geometry and count
pub struct IndexStorage {
    dir: PathBuf,
    dimension: usize,
    root: Option<Locator>,
    records: SlotStorage,
    branches: SlotStorage,
    leaves: SlotStorage,
}

impl IndexStorage {
    /// Creates empty storages in `dir` sized for `dimension`-d records and
    /// leaves of up to `leaf_size` records.
    pub fn create(
        dir: impl AsRef<Path>,
        dimension: usize,
        leaf_size: usize,
        config: &StorageConfig,
    ) -> Result<Self> {
        if dimension == 0 || dimension > i32::MAX as usize {
            return Err(BallTreeError::InvalidInput(format!(
                "cannot store vectors of dimension {}",
                dimension
            )));
        }

        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let sizes = SlotSizes::new(dimension, leaf_size);
        let records = SlotStorage::create(&dir, NodeKind::Record, sizes.record, config)?;
        let branches = SlotStorage::create(&dir, NodeKind::Branch, sizes.branch, config)?;
        let leaves = SlotStorage::create(&dir, NodeKind::Leaf, sizes.leaf, config)?;

        // A stale root header would name nodes of a previous tree
        let root_path = dir.join(ROOT_FILE);
        if root_path.exists() {
            std::fs::remove_file(&root_path)?;
        }

        debug!(dir = %dir.display(), dimension, leaf_size, "created index storage");
        Ok(Self {
            dir,
            dimension,
            root: None,
            records,
            branches,
            leaves,
        })
    }

    /// Opens a persisted index in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let header = RootHeader::read(&dir.join(ROOT_FILE))?;

        let records = SlotStorage::open(&dir, NodeKind::Record, config)?;
        let branches = SlotStorage::open(&dir, NodeKind::Branch, config)?;
        let leaves = SlotStorage::open(&dir, NodeKind::Leaf, config)?;

        let expected = SlotSizes::new(header.dimension, 0);
        if records.slot_size() != expected.record || branches.slot_size() != expected.branch {
            return Err(BallTreeError::Corrupted(format!(
                "slot sizes do not match dimension {}",
                header.dimension
            )));
        }

        info!(
            dir = %dir.display(),
            dimension = header.dimension,
            root = %header.root,
            "opened index storage"
        );
        Ok(Self {
            dir,
            dimension: header.dimension,
            root: Some(header.root),
            records,
            branches,
            leaves,
        })
    }

    /// Returns the index directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Largest number of records a stored leaf can hold.
    pub fn leaf_size(&self) -> usize {
        self.leaves
            .slot_size()
            .saturating_sub(leaf_slot_size(self.dimension, 0))
            / Locator::SIZE
    }

    /// Returns the root locator, once one has been written.
    pub fn root(&self) -> Option<Locator> {
        self.root
    }

    /// Records `root` as the tree root and writes the root header.
    pub fn write_root(&mut self, root: Locator) -> Result<()> {
        let header = RootHeader {
            root,
            dimension: self.dimension,
        };
        header.write(&self.dir.join(ROOT_FILE))?;
        self.root = Some(root);
        Ok(())
    }

    /// Returns the storage for one kind.
    pub fn storage(&self, kind: NodeKind) -> &SlotStorage {
        match kind {
            NodeKind::Record => &self.records,
            NodeKind::Branch => &self.branches,
            NodeKind::Leaf => &self.leaves,
        }
    }

    pub fn put_record(&self, record: &Record) -> Result<Locator> {
        if record.dimension() != self.dimension {
            return Err(BallTreeError::DimensionMismatch {
                expected: self.dimension,
                actual: record.dimension(),
            });
        }
        self.records.put_value(record)
    }

    pub fn put_branch(&self, branch: &StoredBranch) -> Result<Locator> {
        self.branches.put_value(branch)
    }

    pub fn put_leaf(&self, leaf: &StoredLeaf) -> Result<Locator> {
        self.leaves.put_value(leaf)
    }

    pub fn get_record(&self, locator: Locator) -> Result<Record> {
        self.records.get_value(locator)
    }

    /// Reads the branch or leaf named by `locator`.
    pub fn get_node(&self, locator: Locator) -> Result<StoredNode> {
        match locator.kind {
            NodeKind::Branch => self.branches.get_value(locator).map(StoredNode::Branch),
            NodeKind::Leaf => self.leaves.get_value(locator).map(StoredNode::Leaf),
            NodeKind::Record => Err(BallTreeError::SlotKindMismatch {
                expected: NodeKind::Branch,
                actual: NodeKind::Record,
            }),
        }
    }

    /// Flushes every storage.
    pub fn flush(&self) -> Result<()> {
        for kind in NodeKind::ALL {
            self.storage(kind).flush()?;
        }
        Ok(())
    }

    /// Returns statistics for every storage, in kind order.
    pub fn stats(&self) -> [StorageStats; 3] {
        NodeKind::ALL.map(|kind| self.storage(kind).stats())
    }
}

impl std::fmt::Debug for IndexStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStorage")
            .field("dir", &self.dir)
            .field("dimension", &self.dimension)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{index_path, pages_path};
    use balltree_common::page::PageId;
    use tempfile::tempdir;

    fn config() -> StorageConfig {
        StorageConfig {
            max_frames_per_kind: 2,
            slots_per_page: 4,
            fsync_enabled: false,
        }
    }

    #[test]
    fn test_create_lays_out_directory() {
        let dir = tempdir().unwrap();
        let storage = IndexStorage::create(dir.path(), 4, 20, &config()).unwrap();
        assert_eq!(storage.dimension(), 4);
        assert!(storage.root().is_none());

        for kind in NodeKind::ALL {
            assert!(pages_path(dir.path(), kind).exists());
            assert!(index_path(dir.path(), kind).exists());
        }
        assert_eq!(storage.storage(NodeKind::Record).slot_size(), 28);
        assert_eq!(storage.storage(NodeKind::Branch).slot_size(), 50);
        assert_eq!(storage.storage(NodeKind::Leaf).slot_size(), 220);
    }

    #[test]
    fn test_create_rejects_zero_dimension() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            IndexStorage::create(dir.path(), 0, 20, &config()),
            Err(BallTreeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_put_get_nodes() {
        let dir = tempdir().unwrap();
        let storage = IndexStorage::create(dir.path(), 2, 2, &config()).unwrap();

        let r1 = storage.put_record(&Record::new(1, vec![1.0, 0.0])).unwrap();
        let r2 = storage.put_record(&Record::new(2, vec![0.0, 1.0])).unwrap();
        let leaf = StoredLeaf {
            center: vec![0.5, 0.5],
            radius: 0.70710677,
            records: vec![r1, r2],
        };
        let leaf_loc = storage.put_leaf(&leaf).unwrap();
        let branch = StoredBranch {
            center: vec![0.5, 0.5],
            radius: 0.70710677,
            left: leaf_loc,
            right: leaf_loc,
        };
        let branch_loc = storage.put_branch(&branch).unwrap();

        assert_eq!(leaf_loc.kind, NodeKind::Leaf);
        assert_eq!(branch_loc.kind, NodeKind::Branch);
        assert_eq!(storage.get_node(leaf_loc).unwrap(), StoredNode::Leaf(leaf));
        assert_eq!(
            storage.get_node(branch_loc).unwrap(),
            StoredNode::Branch(branch)
        );
        assert_eq!(storage.get_record(r2).unwrap().index, 2);

        assert!(matches!(
            storage.get_node(r1),
            Err(BallTreeError::SlotKindMismatch { .. })
        ));
    }

    #[test]
    fn test_put_record_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let storage = IndexStorage::create(dir.path(), 3, 2, &config()).unwrap();
        assert!(matches!(
            storage.put_record(&Record::new(1, vec![1.0])),
            Err(BallTreeError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_leaf_larger_than_leaf_size_overflows() {
        let dir = tempdir().unwrap();
        let storage = IndexStorage::create(dir.path(), 1, 1, &config()).unwrap();
        let leaf = StoredLeaf {
            center: vec![0.0],
            radius: 0.0,
            records: vec![Locator::new(PageId(0), 0, NodeKind::Record); 2],
        };
        assert!(matches!(
            storage.put_leaf(&leaf),
            Err(BallTreeError::SlotOverflow { .. })
        ));
    }

    #[test]
    fn test_reopen_with_root() {
        let dir = tempdir().unwrap();
        let (record_loc, leaf_loc) = {
            let mut storage = IndexStorage::create(dir.path(), 3, 4, &config()).unwrap();
            let r = storage.put_record(&Record::new(7, vec![1.0, 2.0, 3.0])).unwrap();
            let leaf = storage
                .put_leaf(&StoredLeaf {
                    center: vec![1.0, 2.0, 3.0],
                    radius: 0.0,
                    records: vec![r],
                })
                .unwrap();
            storage.write_root(leaf).unwrap();
            storage.flush().unwrap();
            (r, leaf)
        };

        let storage = IndexStorage::open(dir.path(), &config()).unwrap();
        assert_eq!(storage.dimension(), 3);
        assert_eq!(storage.leaf_size(), 4);
        assert_eq!(storage.root(), Some(leaf_loc));
        match storage.get_node(leaf_loc).unwrap() {
            StoredNode::Leaf(leaf) => assert_eq!(leaf.records, vec![record_loc]),
            other => panic!("expected leaf, got {:?}", other),
        }
        assert_eq!(
            storage.get_record(record_loc).unwrap(),
            Record::new(7, vec![1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_leaf_size_from_slot_size() {
        let dir = tempdir().unwrap();
        for (dimension, leaf_size) in [(1, 1), (2, 20), (50, 7)] {
            let storage =
                IndexStorage::create(dir.path(), dimension, leaf_size, &config()).unwrap();
            assert_eq!(storage.leaf_size(), leaf_size);
        }
    }

    #[test]
    fn test_open_without_root_fails() {
        let dir = tempdir().unwrap();
        {
            IndexStorage::create(dir.path(), 3, 4, &config()).unwrap();
        }
        assert!(matches!(
            IndexStorage::open(dir.path(), &config()),
            Err(BallTreeError::IndexFileMissing(_))
        ));
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            IndexStorage::open(dir.path().join("nope"), &config()),
            Err(BallTreeError::IndexFileMissing(_))
        ));
    }

    #[test]
    fn test_create_clears_stale_root() {
        let dir = tempdir().unwrap();
        {
            let mut storage = IndexStorage::create(dir.path(), 2, 2, &config()).unwrap();
            let r = storage.put_record(&Record::new(1, vec![0.0, 0.0])).unwrap();
            let leaf = storage
                .put_leaf(&StoredLeaf {
                    center: vec![0.0, 0.0],
                    radius: 0.0,
                    records: vec![r],
                })
                .unwrap();
            storage.write_root(leaf).unwrap();
        }
        {
            IndexStorage::create(dir.path(), 2, 2, &config()).unwrap();
        }
        assert!(!dir.path().join(ROOT_FILE).exists());
    }

    #[test]
    fn test_stats_in_kind_order() {
        let dir = tempdir().unwrap();
        let storage = IndexStorage::create(dir.path(), 2, 2, &config()).unwrap();
        storage.put_record(&Record::new(1, vec![0.0, 0.0])).unwrap();

        let stats = storage.stats();
        assert_eq!(stats[0].kind, NodeKind::Record);
        assert_eq!(stats[0].page_count, 1);
        assert_eq!(stats[1].kind, NodeKind::Branch);
        assert_eq!(stats[1].page_count, 0);
        assert_eq!(stats[2].kind, NodeKind::Leaf);
    }
}
