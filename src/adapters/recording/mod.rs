//! Recording adapters that capture port traffic to cassettes.
//!
//! A fetch is stored as `{"url"}` → `{"Ok": body}` or `{"Err": message}`;
//! a generated id as `null` → `"anchor-N"`.

pub mod fetcher;
pub mod id_gen;

pub use fetcher::RecordingFetcher;
pub use id_gen::RecordingIdGenerator;

use std::error::Error;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::cassette::recorder::CassetteRecorder;

/// Shared handle to one port's recorder.
pub type SharedRecorder = Arc<Mutex<CassetteRecorder>>;

fn record(recorder: &SharedRecorder, port: &str, method: &str, input: Value, output: Value) {
    recorder.lock().expect("recorder lock poisoned").record(port, method, input, output);
}

/// Records the outcome of fetching `url`.
pub(crate) fn record_fetch(
    recorder: &SharedRecorder,
    url: &str,
    result: &Result<String, Box<dyn Error + Send + Sync>>,
) {
    let output = match result {
        Ok(body) => json!({ "Ok": body }),
        Err(e) => json!({ "Err": e.to_string() }),
    };
    record(recorder, "fetch", "fetch", json!({ "url": url }), output);
}

/// Records one synthesized anchor id.
pub(crate) fn record_anchor_id(recorder: &SharedRecorder, id: &str) {
    record(recorder, "id_gen", "generate_id", Value::Null, json!(id));
}
