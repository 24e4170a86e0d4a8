//! Paged storage engine for the ball-tree index.
//!
//! This crate provides:
//! - Page files for page-level file I/O
//! - Fixed-length slot pages with an occupancy bitmap
//! - Binary slot codec for records and persisted tree nodes
//! - Per-kind slot storage over a clock-evicting buffer pool
//! - Index storage bundling the record, branch and leaf storages

mod disk;
mod index_storage;
mod meta;
mod page;
mod slot;
mod storage;

pub use disk::PageFile;
pub use index_storage::{IndexStorage, ROOT_FILE};
pub use meta::{KindIndexFile, RootHeader};
pub use page::{PageLayout, SlotPage};
pub use slot::{
    SlotCodec, SlotSizes, StoredBranch, StoredLeaf, StoredNode, branch_slot_size,
    leaf_slot_size, record_slot_size,
};
pub use storage::{SlotStorage, StorageStats, index_path, pages_path};
