//! Single-flight document cache.
//!
//! The first `get` for a URL starts a fetch-and-parse; callers arriving
//! while it is outstanding await the same slot instead of fetching again.
//! Settled results, failures included, are kept until `invalidate`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::OnceCell;

use crate::error::DocumentError;
use crate::ports::DocumentFetcher;
use crate::xml::Document;

/// A cached document. Writers serialize per document.
pub type SharedDocument = Arc<RwLock<Document>>;

type Slot = Arc<OnceCell<Result<SharedDocument, DocumentError>>>;

/// Fetches and parses documents once per URL.
pub struct DocumentCache {
    fetcher: Box<dyn DocumentFetcher>,
    slots: Mutex<HashMap<String, Slot>>,
    fetches: AtomicUsize,
}

impl DocumentCache {
    /// Creates an empty cache over the given fetcher.
    #[must_use]
    pub fn new(fetcher: Box<dyn DocumentFetcher>) -> Self {
        Self { fetcher, slots: Mutex::new(HashMap::new()), fetches: AtomicUsize::new(0) }
    }

    /// Returns the document at `url`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Fetch`] or [`DocumentError::Parse`]; the
    /// same error is replayed to later callers until the URL is invalidated.
    pub async fn get(&self, url: &str) -> Result<SharedDocument, DocumentError> {
        let slot = {
            let mut slots = self.slots.lock().expect("cache lock poisoned");
            Arc::clone(slots.entry(url.to_string()).or_default())
        };
        slot.get_or_init(|| self.load(url)).await.clone()
    }

    async fn load(&self, url: &str) -> Result<SharedDocument, DocumentError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url, "fetching document");

        let body = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| DocumentError::Fetch { url: url.to_string(), message: e.to_string() })?;
        let document = Document::parse(&body)
            .map_err(|source| DocumentError::Parse { url: url.to_string(), source })?;

        tracing::debug!(url, bytes = body.len(), "document cached");
        Ok(Arc::new(RwLock::new(document)))
    }

    /// Forgets the entry for `url` so the next `get` fetches again.
    ///
    /// Callers already awaiting the old slot still receive its result.
    /// Returns `true` if an entry was removed.
    pub fn invalidate(&self, url: &str) -> bool {
        self.slots.lock().expect("cache lock poisoned").remove(url).is_some()
    }

    /// Number of underlying fetches started so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Successfully cached documents, sorted by URL.
    #[must_use]
    pub fn documents(&self) -> Vec<(String, SharedDocument)> {
        let slots = self.slots.lock().expect("cache lock poisoned");
        let mut out: Vec<(String, SharedDocument)> = slots
            .iter()
            .filter_map(|(url, slot)| match slot.get() {
                Some(Ok(doc)) => Some((url.clone(), Arc::clone(doc))),
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
