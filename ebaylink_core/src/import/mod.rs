//! Record and batch import: the fetch, skip, resolve, map, persist, post-process pipeline.

pub mod batch;
pub mod dependency;
pub mod engine;
pub mod locks;
pub mod registry;
pub mod traits;
