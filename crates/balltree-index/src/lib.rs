//! Ball-tree index for maximum inner-product search.
//!
//! This crate provides:
//! - Ball-tree construction with pivot-based partitioning
//! - Branch-and-bound maximum inner-product search over in-memory and
//!   persisted trees
//! - Post-order persistence through the paged storage engine
//! - The [`BallTree`] facade tying build, store, restore and search together

mod builder;
mod node;
mod persist;
mod search;
mod tree;

pub use builder::{
    build_tree, calculate_center, calculate_radius, choose_farthest, pick_pivots, split_records,
};
pub use node::BallTreeNode;
pub use persist::{load_tree, store_tree};
pub use search::{MipSearcher, SearchStats};
pub use tree::{BallTree, SearchResult};

pub use balltree_common::{BallTreeError, IndexConfig, Locator, NodeKind, Record, Result, StorageConfig};
pub use balltree_storage::{IndexStorage, StorageStats, StoredBranch, StoredLeaf, StoredNode};
