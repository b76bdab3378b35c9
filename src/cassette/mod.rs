//! Cassette format for recording and replaying port interactions.
//!
//! A recorded resolution run can be replayed offline: fetches are served by
//! URL and synthesized ids come back in the order they were issued.

pub mod config;
pub mod format;
pub mod recorder;
pub mod replayer;
pub mod session;
