//! Conversion between in-memory trees and persisted trees.

use crate::node::BallTreeNode;
use balltree_common::Result;
use balltree_common::page::Locator;
use balltree_storage::{IndexStorage, StoredBranch, StoredLeaf, StoredNode};
use tracing::info;

/// Persists a subtree bottom-up and returns the locator of its root.
///
/// Children are always written before their parent, so every locator a
/// stored node holds is already valid.
fn store_node(node: &BallTreeNode, storage: &IndexStorage) -> Result<Locator> {
    match node {
        BallTreeNode::Leaf {
            center,
            radius,
            records,
        } => {
            let records = records
                .iter()
                .map(|record| storage.put_record(record))
                .collect::<Result<Vec<_>>>()?;
            storage.put_leaf(&StoredLeaf {
                center: center.clone(),
                radius: *radius,
                records,
            })
        }
        BallTreeNode::Branch {
            center,
            radius,
            left,
            right,
        } => {
            let left = store_node(left, storage)?;
            let right = store_node(right, storage)?;
            storage.put_branch(&StoredBranch {
                center: center.clone(),
                radius: *radius,
                left,
                right,
            })
        }
    }
}

/// Persists a whole tree, writes the root header and flushes every storage.
pub fn store_tree(root: &BallTreeNode, storage: &mut IndexStorage) -> Result<Locator> {
    let locator = store_node(root, storage)?;
    storage.write_root(locator)?;
    storage.flush()?;

    info!(
        dir = %storage.dir().display(),
        root = %locator,
        records = root.record_count(),
        leaves = root.leaf_count(),
        "stored ball tree"
    );
    Ok(locator)
}

/// Reads a persisted subtree back into memory.
pub fn load_tree(storage: &IndexStorage, locator: Locator) -> Result<BallTreeNode> {
    match storage.get_node(locator)? {
        StoredNode::Leaf(leaf) => {
            let records = leaf
                .records
                .iter()
                .map(|&locator| storage.get_record(locator))
                .collect::<Result<Vec<_>>>()?;
            Ok(BallTreeNode::Leaf {
                center: leaf.center,
                radius: leaf.radius,
                records,
            })
        }
        StoredNode::Branch(branch) => Ok(BallTreeNode::Branch {
            center: branch.center,
            radius: branch.radius,
            left: Box::new(load_tree(storage, branch.left)?),
            right: Box::new(load_tree(storage, branch.right)?),
        }),
    }
}
