//! Vector primitives used by tree construction and search.
//!
//! All functions take `f32` slices and accumulate in `f64`, so a score
//! computed against an in-memory record and against the same record read
//! back from storage is bit-identical.
//!
//! Callers must pass slices of equal length. Debug builds assert it.

/// Inner product `Σ a_i * b_i`.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

/// Euclidean norm `sqrt(Σ a_i²)`.
#[inline]
pub fn norm(a: &[f32]) -> f64 {
    a.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt()
}

/// Euclidean (L2) distance `sqrt(Σ (a_i - b_i)²)`.
#[inline]
pub fn distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = x as f64 - y as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}
