//! Ball-tree index common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all ball-tree components.

pub mod config;
pub mod error;
pub mod page;
pub mod record;
pub mod vector;

pub use config::{IndexConfig, StorageConfig};
pub use error::{BallTreeError, Result};
pub use page::{Locator, NodeKind, PageId};
pub use record::Record;
