//! Deferred task execution: queue, dead letters and the retrying worker.

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;
pub mod worker;
