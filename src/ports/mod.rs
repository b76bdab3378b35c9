//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the resolver core and the
//! outside world (document transport, anchor id synthesis).
//! Implementations live in `src/adapters/`.

pub mod fetcher;
pub mod id_gen;

pub use fetcher::{DocumentFetcher, FetchFuture};
pub use id_gen::IdGenerator;
