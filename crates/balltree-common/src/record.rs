//! Indexed vector records.

/// A vector together with its caller-assigned identifier.
///
/// Records are the unit of data the ball tree indexes. They are created
/// once at build time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Caller-assigned identity returned by searches.
    pub index: i32,
    /// Vector components.
    pub data: Vec<f32>,
}

impl Record {
    /// Creates a new record.
    pub fn new(index: i32, data: Vec<f32>) -> Self {
        Self { index, data }
    }

    /// Returns the vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }
}
