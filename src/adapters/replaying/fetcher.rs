//! Replaying adapter for the `DocumentFetcher` port.

use std::error::Error;

use serde_json::json;

use super::replay_fetch;
use crate::cassette::replayer::CassetteReplayer;
use crate::ports::{DocumentFetcher, FetchFuture};

/// Serves recorded fetches from a cassette, matched by URL.
///
/// Fan-out fetches complete in no fixed order, so replay is keyed on the
/// request rather than on sequence.
pub struct ReplayingFetcher {
    replayer: CassetteReplayer,
}

impl ReplayingFetcher {
    /// Creates a new replaying fetcher from a cassette replayer.
    #[must_use]
    pub fn new(replayer: CassetteReplayer) -> Self {
        Self { replayer }
    }
}

impl DocumentFetcher for ReplayingFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let recorded = self.replayer.find_interaction("fetch", "fetch", &json!({ "url": url }));
        let result: Result<String, Box<dyn Error + Send + Sync>> = match recorded {
            Some(interaction) => replay_fetch(url, &interaction.output),
            None => Err(format!("No recorded fetch for {url}").into()),
        };
        Box::pin(async move { result })
    }
}
