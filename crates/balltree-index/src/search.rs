//! Branch-and-bound maximum inner-product search.
//!
//! For a ball with center `c` and radius `r`, no record inside it can have
//! an inner product with the query `q` above `q·c + r·|q|`. The searcher
//! visits the child with the larger bound first and skips any subtree whose
//! bound does not exceed the best score found so far.

use crate::node::BallTreeNode;
use balltree_common::page::Locator;
use balltree_common::vector::{inner_product, norm};
use balltree_common::{Record, Result};
use balltree_storage::{IndexStorage, StoredNode};

/// Counters collected during one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes whose contents were examined.
    pub nodes_visited: usize,
    /// Subtrees skipped because their bound could not beat the best score.
    pub subtrees_pruned: usize,
    /// Records whose inner product was computed.
    pub records_scored: usize,
}

/// State of one maximum inner-product search.
pub struct MipSearcher<'a> {
    needle: &'a [f32],
    needle_norm: f64,
    best_index: Option<i32>,
    best_score: f64,
    stats: SearchStats,
}

impl<'a> MipSearcher<'a> {
    /// Starts a search for `needle` with no best candidate yet.
    pub fn new(needle: &'a [f32]) -> Self {
        Self {
            needle,
            needle_norm: norm(needle),
            best_index: None,
            best_score: f64::NEG_INFINITY,
            stats: SearchStats::default(),
        }
    }

    /// Upper bound on the inner product of the needle with anything in the ball.
    #[inline]
    pub fn bound(&self, center: &[f32], radius: f64) -> f64 {
        inner_product(self.needle, center) + radius * self.needle_norm
    }

    /// Best `(index, score)` found so far.
    pub fn best(&self) -> Option<(i32, f64)> {
        self.best_index.map(|index| (index, self.best_score))
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    fn score(&mut self, record: &Record) {
        self.stats.records_scored += 1;
        let score = inner_product(self.needle, &record.data);
        if score > self.best_score {
            self.best_score = score;
            self.best_index = Some(record.index);
        }
    }

    /// Orders two children by bound, larger first. Ties favour the right child.
    fn order<T>(&self, left: (T, f64), right: (T, f64)) -> [(T, f64); 2] {
        if left.1 > right.1 {
            [left, right]
        } else {
            [right, left]
        }
    }

    /// Searches an in-memory subtree.
    pub fn visit_memory(&mut self, node: &BallTreeNode) {
        self.stats.nodes_visited += 1;
        match node {
            BallTreeNode::Leaf { records, .. } => {
                for record in records {
                    self.score(record);
                }
            }
            BallTreeNode::Branch { left, right, .. } => {
                let left_bound = self.bound(left.center(), left.radius());
                let right_bound = self.bound(right.center(), right.radius());

                for (child, bound) in self.order((left, left_bound), (right, right_bound)) {
                    if bound > self.best_score {
                        self.visit_memory(child);
                    } else {
                        self.stats.subtrees_pruned += 1;
                    }
                }
            }
        }
    }

    /// Searches a persisted subtree, paging nodes and records in through
    /// `storage`. Visits nodes in the same order as [`Self::visit_memory`].
    pub fn visit_stored(&mut self, storage: &IndexStorage, locator: Locator) -> Result<()> {
        let node = storage.get_node(locator)?;
        self.visit_stored_node(storage, &node)
    }

    fn visit_stored_node(&mut self, storage: &IndexStorage, node: &StoredNode) -> Result<()> {
        self.stats.nodes_visited += 1;
        match node {
            StoredNode::Leaf(leaf) => {
                for &locator in &leaf.records {
                    let record = storage.get_record(locator)?;
                    self.score(&record);
                }
            }
            StoredNode::Branch(branch) => {
                let left = storage.get_node(branch.left)?;
                let right = storage.get_node(branch.right)?;
                let left_bound = self.bound(left.center(), left.radius());
                let right_bound = self.bound(right.center(), right.radius());

                for (child, bound) in self.order((left, left_bound), (right, right_bound)) {
                    if bound > self.best_score {
                        self.visit_stored_node(storage, &child)?;
                    } else {
                        self.stats.subtrees_pruned += 1;
                    }
                }
            }
        }
        Ok(())
    }
}
