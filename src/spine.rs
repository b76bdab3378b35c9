//! Chunk initialization.
//!
//! A [`Spine`] is one chunk of the apparatus. [`SpineResolver::initialize`]
//! takes it from `Uninitialized` to `Ready` through six phases, each run
//! over every apparatus before the next starts:
//!
//! 1. load the spine document
//! 2. parse every `<app>`
//! 3. fetch every referenced witness document concurrently
//! 4. anchor `string-range(...)` targets to element ids
//! 5. dereference every pointer to its element
//! 6. write a back-reference onto every resolved element
//!
//! Phases 1-3 and 5 abort the chunk on failure. Phase 4 drops the failing
//! pointer under the default policy. Phase 6 only fails on a broken invariant.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;
use tracing::Instrument;

use crate::cache::SharedDocument;
use crate::config::MissPolicy;
use crate::context::ResolverContext;
use crate::error::{DocumentError, IntegrityError, RangeError, ResolveError, SchemaError};
use crate::model::{Apparatus, ElementRef, Pointer, RangeExpr, Target};
use crate::parser::ApparatusParser;
use crate::xml::{strip_name_prefix, XPath, STABLE_ID_ATTRIBUTE};

/// Attribute written onto resolved witness elements, naming the apparatus.
pub const BACK_REFERENCE_ATTRIBUTE: &str = "data-app";

/// Namespace prefix that upstream range expressions carry but witness
/// documents do not use; removed from name tests before evaluation.
pub const STRIPPED_XPATH_PREFIX: &str = "tei:";

/// Lifecycle of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpineState {
    /// Never initialized, or the last attempt failed.
    Uninitialized,
    /// A pipeline run is in flight.
    Initializing,
    /// Fully resolved.
    Ready,
}

/// Resolved state of a chunk.
#[derive(Debug)]
pub struct SpineContents {
    /// URL the spine document was loaded from.
    pub url: String,
    /// The spine document, with range targets rewritten.
    pub document: SharedDocument,
    /// Apparatus entries whose pointers all carry a resolved element.
    pub apparatuses: Vec<Apparatus>,
}

/// One chunk of the apparatus.
#[derive(Debug)]
pub struct Spine {
    chunk: u32,
    state: Mutex<SpineState>,
    init: tokio::sync::Mutex<()>,
    contents: OnceLock<SpineContents>,
}

impl Spine {
    /// Creates an uninitialized chunk.
    #[must_use]
    pub fn new(chunk: u32) -> Self {
        Self {
            chunk,
            state: Mutex::new(SpineState::Uninitialized),
            init: tokio::sync::Mutex::new(()),
            contents: OnceLock::new(),
        }
    }

    /// The chunk number.
    #[must_use]
    pub fn chunk(&self) -> u32 {
        self.chunk
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SpineState {
        *self.state.lock().expect("spine state lock poisoned")
    }

    fn set_state(&self, state: SpineState) {
        *self.state.lock().expect("spine state lock poisoned") = state;
    }

    /// Resolved contents, once `Ready`.
    #[must_use]
    pub fn contents(&self) -> Option<&SpineContents> {
        self.contents.get()
    }

    /// Resolved apparatus entries; empty until `Ready`.
    #[must_use]
    pub fn apparatuses(&self) -> &[Apparatus] {
        self.contents().map(|c| c.apparatuses.as_slice()).unwrap_or_default()
    }
}

/// Returns a chunk to `Uninitialized` when a run fails or its future is
/// dropped before completing.
struct ResetOnDrop<'s> {
    spine: &'s Spine,
    armed: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.spine.set_state(SpineState::Uninitialized);
        }
    }
}

/// Runs the resolution pipeline against a context.
pub struct SpineResolver<'a> {
    ctx: &'a ResolverContext,
}

impl<'a> SpineResolver<'a> {
    /// Creates a resolver over `ctx`.
    #[must_use]
    pub fn new(ctx: &'a ResolverContext) -> Self {
        Self { ctx }
    }

    /// Brings `spine` to `Ready`. A no-op once it is.
    ///
    /// Concurrent callers wait for the run in flight instead of starting
    /// another. On failure, or if the future is dropped mid-run, the chunk
    /// returns to `Uninitialized`; changes already written into cached
    /// documents stay visible.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ResolveError`] of the run.
    pub async fn initialize(&self, spine: &Spine) -> Result<(), ResolveError> {
        if spine.contents.get().is_some() {
            return Ok(());
        }
        let _guard = spine.init.lock().await;
        if spine.contents.get().is_some() {
            return Ok(());
        }

        spine.set_state(SpineState::Initializing);
        let mut reset = ResetOnDrop { spine, armed: true };
        let span = tracing::info_span!("spine", chunk = spine.chunk);
        match self.resolve(spine.chunk).instrument(span).await {
            Ok(contents) => {
                tracing::info!(
                    chunk = spine.chunk,
                    apparatuses = contents.apparatuses.len(),
                    "chunk ready"
                );
                let _ = spine.contents.set(contents);
                spine.set_state(SpineState::Ready);
                reset.armed = false;
                Ok(())
            }
            Err(err) => {
                tracing::error!(chunk = spine.chunk, error = %err, "chunk initialization failed");
                Err(err)
            }
        }
    }

    /// Runs all six phases for `chunk` without touching any `Spine` state.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ResolveError`].
    pub async fn resolve(&self, chunk: u32) -> Result<SpineContents, ResolveError> {
        let url = self.ctx.settings.spine_url(chunk);

        let document = self.load(&url).await?;
        let apparatuses = self.parse(&document)?;
        tracing::debug!(apparatuses = apparatuses.len(), "parsed spine");

        self.fetch_witnesses(&apparatuses).await?;
        let apparatuses = self.rewrite_ranges(&document, apparatuses).await?;
        let apparatuses = self.dereference(apparatuses).await?;
        self.inject_back_references(&apparatuses)?;

        Ok(SpineContents { url, document, apparatuses })
    }

    /// Phase 1: fetch the spine document.
    ///
    /// # Errors
    ///
    /// Returns the cache's fetch or parse error.
    pub async fn load(&self, url: &str) -> Result<SharedDocument, DocumentError> {
        self.ctx.cache.get(url).await
    }

    /// Phase 2: parse every `<app>` in document order.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`]; no partial list is produced.
    pub fn parse(&self, document: &SharedDocument) -> Result<Vec<Apparatus>, SchemaError> {
        let doc = document.read().expect("document lock poisoned");
        let parser = ApparatusParser::new(&self.ctx.registry);
        let apparatuses =
            doc.elements_named("app").into_iter().map(|app| parser.parse(&doc, app)).collect();
        apparatuses
    }

    /// Phase 3: fetch every distinct pointer URL concurrently and wait for all.
    ///
    /// Returns the fetched URLs in sorted order.
    ///
    /// # Errors
    ///
    /// Returns the first failure once every fetch has settled.
    pub async fn fetch_witnesses(
        &self,
        apparatuses: &[Apparatus],
    ) -> Result<Vec<String>, DocumentError> {
        let urls: BTreeSet<&str> =
            apparatuses.iter().flat_map(|a| &a.pointers).map(|p| p.url.as_str()).collect();
        tracing::debug!(documents = urls.len(), "fetching witness documents");

        let results = futures::future::join_all(urls.iter().map(|url| self.ctx.cache.get(url))).await;
        let mut failures = results.into_iter().filter_map(Result::err);
        if let Some(first) = failures.next() {
            tracing::warn!(failed = failures.count() + 1, "witness fetch failed");
            return Err(first);
        }
        Ok(urls.into_iter().map(str::to_string).collect())
    }

    /// Phase 4: rewrite range targets to element ids.
    ///
    /// # Errors
    ///
    /// Only when the range-miss policy is [`MissPolicy::Fail`].
    pub async fn rewrite_ranges(
        &self,
        spine_document: &SharedDocument,
        apparatuses: Vec<Apparatus>,
    ) -> Result<Vec<Apparatus>, ResolveError> {
        let policy = self.ctx.settings.policy.range_miss;
        let mut out = Vec::with_capacity(apparatuses.len());

        for Apparatus { id, n, pointers: original } in apparatuses {
            let mut pointers = Vec::with_capacity(original.len());
            for pointer in original {
                let Target::Range(expression) = &pointer.target else {
                    pointers.push(pointer);
                    continue;
                };
                let expression = expression.clone();
                let url = pointer.url.clone();

                match self.anchor_range(spine_document, pointer, &expression).await {
                    Ok(anchored) => pointers.push(anchored),
                    Err(source) if policy == MissPolicy::Fail => {
                        return Err(ResolveError::Range { apparatus: id, source });
                    }
                    Err(err) => tracing::warn!(
                        apparatus = %id,
                        url = %url,
                        expression = %expression,
                        error = %err,
                        "dropping range pointer"
                    ),
                }
            }
            out.push(Apparatus { id, n, pointers });
        }
        Ok(out)
    }

    async fn anchor_range(
        &self,
        spine_document: &SharedDocument,
        pointer: Pointer,
        expression: &str,
    ) -> Result<Pointer, RangeError> {
        let range: RangeExpr = expression.parse()?;
        let patched = strip_name_prefix(&range.xpath, STRIPPED_XPATH_PREFIX);
        let xpath = XPath::parse(&patched)?;
        let document = self.ctx.cache.get(&pointer.url).await?;

        let anchor = {
            let mut doc = document.write().expect("document lock poisoned");
            let matches = xpath.evaluate(&doc);
            let &[node] = matches.as_slice() else {
                return Err(RangeError::MatchCount { xpath: patched, count: matches.len() });
            };
            let existing = doc.attribute(node, STABLE_ID_ATTRIBUTE).map(str::to_string);
            if let Some(existing) = existing {
                existing
            } else {
                let id = self.ctx.id_gen.generate_id();
                doc.set_attribute(node, STABLE_ID_ATTRIBUTE, &id);
                tracing::debug!(url = %pointer.url, id = %id, xpath = %patched, "synthesized anchor");
                id
            }
        };

        let anchored = pointer.anchored(anchor);
        spine_document.write().expect("document lock poisoned").set_attribute(
            anchored.element,
            "target",
            &anchored.target_string(),
        );
        Ok(anchored)
    }

    /// Phase 5: resolve every id target to exactly one element.
    ///
    /// # Errors
    ///
    /// [`IntegrityError`] on zero or several matches unless the
    /// dereference policy is [`MissPolicy::Drop`]; `Invariant` if a range
    /// target survived phase 4.
    pub async fn dereference(
        &self,
        apparatuses: Vec<Apparatus>,
    ) -> Result<Vec<Apparatus>, ResolveError> {
        let policy = self.ctx.settings.policy.dereference_miss;
        let mut out = Vec::with_capacity(apparatuses.len());

        for Apparatus { id, n, pointers: original } in apparatuses {
            let mut pointers = Vec::with_capacity(original.len());
            for pointer in original {
                let Target::Id(anchor) = &pointer.target else {
                    return Err(ResolveError::Invariant(format!(
                        "apparatus {id}: {} reached dereference unanchored",
                        pointer.target_string()
                    )));
                };
                let anchor = anchor.clone();
                let document = self.ctx.cache.get(&pointer.url).await?;
                let matches = document
                    .read()
                    .expect("document lock poisoned")
                    .find_by_attribute(STABLE_ID_ATTRIBUTE, &anchor);

                let miss = match matches.as_slice() {
                    &[node] => {
                        let element = ElementRef::new(pointer.url.clone(), node, document);
                        pointers.push(pointer.resolved(element));
                        continue;
                    }
                    [] => IntegrityError::MissingAnchor {
                        apparatus: id.clone(),
                        url: pointer.url.clone(),
                        id: anchor,
                    },
                    many => IntegrityError::DuplicateAnchor {
                        apparatus: id.clone(),
                        url: pointer.url.clone(),
                        id: anchor,
                        count: many.len(),
                    },
                };
                match policy {
                    MissPolicy::Fail => return Err(miss.into()),
                    MissPolicy::Drop => tracing::warn!(error = %miss, "dropping unresolved pointer"),
                }
            }
            out.push(Apparatus { id, n, pointers });
        }
        Ok(out)
    }

    /// Phase 6: name the owning apparatus on every resolved element.
    ///
    /// When several apparatuses claim one element the last one processed wins.
    ///
    /// # Errors
    ///
    /// `Invariant` if a pointer has no resolved element.
    pub fn inject_back_references(&self, apparatuses: &[Apparatus]) -> Result<(), ResolveError> {
        for apparatus in apparatuses {
            for pointer in &apparatus.pointers {
                let element = pointer.dereferenced.as_ref().ok_or_else(|| {
                    ResolveError::Invariant(format!(
                        "apparatus {}: {} reached back-reference injection unresolved",
                        apparatus.id,
                        pointer.target_string()
                    ))
                })?;
                element.set_attribute(BACK_REFERENCE_ATTRIBUTE, &apparatus.id);
            }
        }
        Ok(())
    }
}
