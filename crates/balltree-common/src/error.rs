//! Error types for the ball-tree index.

use crate::page::{Locator, NodeKind};
use thiserror::Error;

/// Result type alias using BallTreeError.
pub type Result<T> = std::result::Result<T, BallTreeError>;

/// Errors that can occur in ball-tree operations.
#[derive(Debug, Error)]
pub enum BallTreeError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("Index file missing: {0}")]
    IndexFileMissing(String),

    #[error("Storage corrupted: {0}")]
    Corrupted(String),

    #[error("Slot not found: {0}")]
    SlotNotFound(Locator),

    #[error("Slot kind mismatch: expected {expected}, got {actual}")]
    SlotKindMismatch { expected: NodeKind, actual: NodeKind },

    #[error("Slot overflow: {size} bytes (max {max})")]
    SlotOverflow { size: usize, max: usize },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Index errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index not built")]
    IndexNotBuilt,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    // Configuration errors
    #[error("Invalid configuration: {name} = {value}")]
    InvalidConfig { name: String, value: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
