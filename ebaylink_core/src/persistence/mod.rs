//! Host-side persistence of internal entities.

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;
