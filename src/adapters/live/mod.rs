//! Live adapters for real external interactions.

pub mod fetcher;
pub mod id_gen;
