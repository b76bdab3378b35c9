//! Replaying adapters that serve recorded port traffic from cassettes.

pub mod fetcher;
pub mod id_gen;

pub use fetcher::ReplayingFetcher;
pub use id_gen::ReplayingIdGenerator;

use std::error::Error;

use serde_json::Value;

/// Decodes a fetch outcome written by `recording::record_fetch`.
pub(crate) fn replay_fetch(
    url: &str,
    output: &Value,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    if let Some(message) = output.get("Err") {
        return Err(message.as_str().unwrap_or("unknown error").into());
    }
    match output.get("Ok").and_then(Value::as_str) {
        Some(body) => Ok(body.to_string()),
        None => Err(format!("recorded fetch of {url} has no body").into()),
    }
}
