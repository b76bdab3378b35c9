//! Document fetcher port for retrieving raw XML by URL.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

/// Boxed future type alias used by [`DocumentFetcher`] to keep the trait dyn-compatible.
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// Retrieves document bodies.
///
/// Parsing and caching happen above this boundary; a fetcher only moves bytes.
pub trait DocumentFetcher: Send + Sync {
    /// Fetches the body stored at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the resource is unavailable.
    fn fetch(&self, url: &str) -> FetchFuture<'_>;
}
