//! Marketplace accounts (backends) and their persisted sync state.

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;
