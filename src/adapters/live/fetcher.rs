//! Live adapter for the `DocumentFetcher` port.

use reqwest::Client;

use crate::ports::fetcher::{DocumentFetcher, FetchFuture};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches `http(s)://` URLs over the network and everything else from disk.
///
/// A `file://` scheme is stripped; any other URL is treated as a path
/// relative to the working directory.
pub struct LiveFetcher {
    client: Client,
}

impl LiveFetcher {
    /// Creates a new live fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for LiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFetcher for LiveFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let url = url.to_string();

        Box::pin(async move {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                let path = url.strip_prefix("file://").unwrap_or(&url);
                return tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| -> BoxError { format!("Failed to read {path}: {e}").into() });
            }

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| -> BoxError { format!("Request to {url} failed: {e}").into() })?;

            let status = response.status();
            if !status.is_success() {
                let message: BoxError = format!("GET {url} returned {}", status.as_u16()).into();
                return Err(message);
            }

            response.text().await.map_err(|e| -> BoxError {
                format!("Failed to read response body from {url}: {e}").into()
            })
        })
    }
}
