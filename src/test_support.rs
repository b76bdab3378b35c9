//! In-memory doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ports::{DocumentFetcher, FetchFuture};

/// Serves documents from a map and counts every call.
pub struct MemFetcher {
    documents: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl MemFetcher {
    pub fn new<'a>(documents: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            documents: Mutex::new(
                documents.into_iter().map(|(u, b)| (u.to_string(), b.to_string())).collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn insert(&self, url: &str, body: &str) {
        self.documents.lock().unwrap().insert(url.to_string(), body.to_string());
    }
}

impl DocumentFetcher for MemFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.documents.lock().unwrap().get(url).cloned();
        let url = url.to_string();
        Box::pin(async move {
            // Suspend so concurrent callers interleave.
            tokio::task::yield_now().await;
            body.ok_or_else(|| -> Box<dyn std::error::Error + Send + Sync> {
                format!("404 {url}").into()
            })
        })
    }
}

impl DocumentFetcher for Arc<MemFetcher> {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        self.as_ref().fetch(url)
    }
}
