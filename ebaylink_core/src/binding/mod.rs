//! Identity binding between marketplace records and host entities.

pub mod binder;
pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;
