//! Declarative field mapping between external records and internal field values.

pub mod export;
pub mod mapper;
pub mod rules;
