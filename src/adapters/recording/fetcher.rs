//! Recording adapter for the `DocumentFetcher` port.

use super::{record_fetch, SharedRecorder};
use crate::ports::{DocumentFetcher, FetchFuture};

/// Records fetches while delegating to an inner implementation.
pub struct RecordingFetcher {
    inner: Box<dyn DocumentFetcher>,
    recorder: SharedRecorder,
}

impl RecordingFetcher {
    /// Creates a new recording fetcher wrapping the given implementation.
    pub fn new(inner: Box<dyn DocumentFetcher>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl DocumentFetcher for RecordingFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let url = url.to_string();

        Box::pin(async move {
            let result = self.inner.fetch(&url).await;
            record_fetch(&self.recorder, &url, &result);
            result
        })
    }
}
