//! In-memory ball-tree nodes.

use balltree_common::Record;

/// A node of an in-memory ball tree.
///
/// Every node is a ball: all records in its subtree lie within `radius` of
/// `center`. The tree owns its children and records outright until it is
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum BallTreeNode {
    /// Interior node whose two children partition its records.
    Branch {
        center: Vec<f32>,
        radius: f64,
        left: Box<BallTreeNode>,
        right: Box<BallTreeNode>,
    },
    /// Terminal node holding the records directly.
    Leaf {
        center: Vec<f32>,
        radius: f64,
        records: Vec<Record>,
    },
}

impl BallTreeNode {
    #[inline]
    pub fn center(&self) -> &[f32] {
        match self {
            BallTreeNode::Branch { center, .. } | BallTreeNode::Leaf { center, .. } => center,
        }
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        match self {
            BallTreeNode::Branch { radius, .. } | BallTreeNode::Leaf { radius, .. } => *radius,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BallTreeNode::Leaf { .. })
    }

    /// Number of records in the subtree.
    pub fn record_count(&self) -> usize {
        match self {
            BallTreeNode::Branch { left, right, .. } => left.record_count() + right.record_count(),
            BallTreeNode::Leaf { records, .. } => records.len(),
        }
    }

    /// Number of leaves in the subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            BallTreeNode::Branch { left, right, .. } => left.leaf_count() + right.leaf_count(),
            BallTreeNode::Leaf { .. } => 1,
        }
    }

    /// Height of the subtree. A leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            BallTreeNode::Branch { left, right, .. } => 1 + left.depth().max(right.depth()),
            BallTreeNode::Leaf { .. } => 1,
        }
    }

    /// Visits every record in the subtree, left to right.
    pub fn for_each_record<F: FnMut(&Record)>(&self, f: &mut F) {
        match self {
            BallTreeNode::Branch { left, right, .. } => {
                left.for_each_record(f);
                right.for_each_record(f);
            }
            BallTreeNode::Leaf { records, .. } => records.iter().for_each(|r| f(r)),
        }
    }
}
