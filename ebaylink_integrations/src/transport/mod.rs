//! eBay REST transport and the normalization of its payloads.

pub mod normalize;
pub mod rest;
