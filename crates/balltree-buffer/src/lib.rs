//! Buffer pool management for ball-tree storage.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count and page size
//! - Clock (second-chance) eviction policy
//! - Dirty page tracking for write-back

mod frame;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats};
pub use replacer::{ClockReplacer, Replacer};
