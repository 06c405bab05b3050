//! Marketplace transport seam and its in-memory implementation.

pub mod memory;
pub mod traits;
