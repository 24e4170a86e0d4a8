//! Recursive ball-tree construction.
//!
//! A set of at most `leaf_size` records becomes a leaf. Larger sets are
//! split around two far-apart pivots: `a` is the record farthest from the
//! first record, `b` the record farthest from `a`. Records closer to `a`
//! go left, the rest go right. Every node's center is the mean of its
//! records and its radius the largest distance from that center.

use crate::node::BallTreeNode;
use balltree_common::Record;
use balltree_common::vector::distance;

/// Per-coordinate mean of the records' vectors.
///
/// Sums are accumulated in `f64` and narrowed to `f32` at the end.
pub fn calculate_center(records: &[Record]) -> Vec<f32> {
    assert!(!records.is_empty(), "center of an empty record set");
    let dimension = records[0].dimension();

    let mut sums = vec![0f64; dimension];
    for record in records {
        for (sum, &x) in sums.iter_mut().zip(&record.data) {
            *sum += x as f64;
        }
    }

    let n = records.len() as f64;
    sums.into_iter().map(|s| (s / n) as f32).collect()
}

/// Largest distance from `center` to any record.
pub fn calculate_radius(records: &[Record], center: &[f32]) -> f64 {
    records
        .iter()
        .map(|r| distance(&r.data, center))
        .fold(0.0, f64::max)
}

/// Returns the record farthest from `pivot`.
///
/// Only a strictly greater distance replaces the current choice, so the
/// first of several equally distant records wins. Returns `pivot` itself
/// when no record lies at a positive distance.
pub fn choose_farthest<'a>(records: &'a [Record], pivot: &'a Record) -> &'a Record {
    let mut farthest = pivot;
    let mut max_distance = 0.0;
    for record in records {
        let d = distance(&record.data, &pivot.data);
        if d > max_distance {
            max_distance = d;
            farthest = record;
        }
    }
    farthest
}

/// Picks the two split pivots of a record set.
pub fn pick_pivots(records: &[Record]) -> (&Record, &Record) {
    assert!(!records.is_empty(), "pivots of an empty record set");
    let a = choose_farthest(records, &records[0]);
    let b = choose_farthest(records, a);
    (a, b)
}

/// Stable partition into records strictly closer to `a` and the rest.
pub fn split_records(records: Vec<Record>, a: &[f32], b: &[f32]) -> (Vec<Record>, Vec<Record>) {
    records
        .into_iter()
        .partition(|r| distance(&r.data, a) < distance(&r.data, b))
}

/// Builds a ball tree over `records`.
///
/// # Panics
///
/// Panics if `records` is empty or `leaf_size` is zero.
pub fn build_tree(records: Vec<Record>, leaf_size: usize) -> BallTreeNode {
    assert!(!records.is_empty(), "cannot build a ball tree from no records");
    assert!(leaf_size > 0, "leaf size must be positive");

    let center = calculate_center(&records);
    let radius = calculate_radius(&records, &center);

    if records.len() <= leaf_size {
        return BallTreeNode::Leaf {
            center,
            radius,
            records,
        };
    }

    let (a, b) = {
        let (a, b) = pick_pivots(&records);
        (a.data.clone(), b.data.clone())
    };
    let (mut left, mut right) = split_records(records, &a, &b);

    // Only coincident records produce a one-sided split
    if left.is_empty() || right.is_empty() {
        let mut all = if left.is_empty() { right } else { left };
        let upper = all.split_off(all.len() / 2);
        left = all;
        right = upper;
    }

    BallTreeNode::Branch {
        center,
        radius,
        left: Box::new(build_tree(left, leaf_size)),
        right: Box::new(build_tree(right, leaf_size)),
    }
}
