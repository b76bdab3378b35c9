//! Resolver context bundling the ports, the document cache and the chunks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::adapters::live::fetcher::LiveFetcher;
use crate::adapters::live::id_gen::SequentialIdGenerator;
use crate::adapters::recording::fetcher::RecordingFetcher;
use crate::adapters::recording::id_gen::RecordingIdGenerator;
use crate::adapters::replaying::fetcher::ReplayingFetcher;
use crate::adapters::replaying::id_gen::ReplayingIdGenerator;
use crate::cache::DocumentCache;
use crate::cassette::config::CassetteConfig;
use crate::cassette::session::RecordingSession;
use crate::config::Settings;
use crate::error::ResolveError;
use crate::ports::{DocumentFetcher, FetchFuture, IdGenerator};
use crate::registry::EditionRegistry;
use crate::spine::{Spine, SpineResolver};

/// Everything chunk resolution depends on.
///
/// One context owns one document cache, so every chunk resolved through it
/// shares fetched documents and sees the others' anchors and back-references.
/// Constructors wire different adapter implementations (live, recording,
/// replaying).
pub struct ResolverContext {
    /// Shared document cache.
    pub cache: DocumentCache,
    /// Known editions.
    pub registry: EditionRegistry,
    /// Source of synthesized anchor ids.
    pub id_gen: Box<dyn IdGenerator>,
    /// Settings in effect.
    pub settings: Settings,
    chunks: Mutex<HashMap<u32, Arc<Spine>>>,
}

impl ResolverContext {
    /// Creates a context from explicit ports.
    #[must_use]
    pub fn new(
        settings: Settings,
        registry: EditionRegistry,
        fetcher: Box<dyn DocumentFetcher>,
        id_gen: Box<dyn IdGenerator>,
    ) -> Self {
        Self {
            cache: DocumentCache::new(fetcher),
            registry,
            id_gen,
            settings,
            chunks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a context that reads files and HTTP and numbers anchors from 0.
    #[must_use]
    pub fn live(settings: Settings, registry: EditionRegistry) -> Self {
        let id_gen = SequentialIdGenerator::new(settings.anchor_prefix.clone());
        Self::new(settings, registry, Box::new(LiveFetcher::new()), Box::new(id_gen))
    }

    /// Creates a live context whose port traffic is recorded into `session`.
    ///
    /// The context must be dropped before `session.finish()`.
    #[must_use]
    pub fn recording(
        settings: Settings,
        registry: EditionRegistry,
        session: &RecordingSession,
    ) -> Self {
        let fetcher = RecordingFetcher::new(Box::new(LiveFetcher::new()), Arc::clone(&session.fetch));
        let id_gen = RecordingIdGenerator::new(
            Box::new(SequentialIdGenerator::new(settings.anchor_prefix.clone())),
            Arc::clone(&session.id_gen),
        );
        Self::new(settings, registry, Box::new(fetcher), Box::new(id_gen))
    }

    /// Creates a context served entirely from per-port cassettes.
    ///
    /// Ports without a cassette panic with a clear message when called.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured cassette file cannot be read or parsed,
    /// or if the id cassette holds a non-string id.
    pub fn replaying_from(
        settings: Settings,
        registry: EditionRegistry,
        config: &CassetteConfig,
    ) -> Result<Self, String> {
        let replayers = config.load_all()?;

        let fetcher: Box<dyn DocumentFetcher> = match replayers.fetch {
            Some(r) => Box::new(ReplayingFetcher::new(r)),
            None => Box::new(PanickingFetcher),
        };
        let id_gen: Box<dyn IdGenerator> = match replayers.id_gen {
            Some(r) => Box::new(ReplayingIdGenerator::new(&r)?),
            None => Box::new(PanickingIdGenerator),
        };
        Ok(Self::new(settings, registry, fetcher, id_gen))
    }

    /// The chunk with number `chunk`, created uninitialized on first request.
    pub fn spine(&self, chunk: u32) -> Arc<Spine> {
        let mut chunks = self.chunks.lock().expect("chunk table lock poisoned");
        Arc::clone(chunks.entry(chunk).or_insert_with(|| Arc::new(Spine::new(chunk))))
    }

    /// Looks up and initializes a chunk.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the resolution pipeline.
    pub async fn initialize_chunk(&self, chunk: u32) -> Result<Arc<Spine>, ResolveError> {
        let spine = self.spine(chunk);
        SpineResolver::new(self).initialize(&spine).await?;
        Ok(spine)
    }

    /// Every chunk requested so far, by chunk number.
    #[must_use]
    pub fn chunks(&self) -> Vec<Arc<Spine>> {
        let chunks = self.chunks.lock().expect("chunk table lock poisoned");
        let mut out: Vec<Arc<Spine>> = chunks.values().cloned().collect();
        out.sort_by_key(|spine| spine.chunk());
        out
    }
}

// --- Panicking adapters for unspecified ports ---

struct PanickingFetcher;
impl DocumentFetcher for PanickingFetcher {
    fn fetch(&self, _url: &str) -> FetchFuture<'_> {
        panic!("DocumentFetcher port not configured in CassetteConfig: no cassette loaded for fetch");
    }
}

struct PanickingIdGenerator;
impl IdGenerator for PanickingIdGenerator {
    fn generate_id(&self) -> String {
        panic!("IdGenerator port not configured in CassetteConfig: no cassette loaded for id_gen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{Cassette, Interaction};
    use crate::spine::SpineState;
    use crate::test_support::MemFetcher;
    use chrono::Utc;
    use serde_json::json;
    use std::path::Path;

    const SPINE: &str = r##"<TEI><body>
        <app xml:id="app1"><rdgGrp xml:id="g1">
          <rdg wit="#f1818"><ptr target="w1818.xml#p1"/></rdg>
        </rdgGrp></app>
    </body></TEI>"##;

    const WITNESS: &str = r#"<TEI><body><p xml:id="p1">Chapter 1</p></body></TEI>"#;

    fn write_cassette(path: &Path, port: &str, interactions: Vec<(&str, serde_json::Value, serde_json::Value)>) {
        let cassette = Cassette {
            name: "test".into(),
            recorded_at: Utc::now(),
            source: "spine".into(),
            interactions: interactions
                .into_iter()
                .enumerate()
                .map(|(seq, (method, input, output))| Interaction {
                    seq: seq as u64,
                    port: port.into(),
                    method: method.into(),
                    input,
                    output,
                })
                .collect(),
        };
        std::fs::write(path, serde_yaml::to_string(&cassette).unwrap()).unwrap();
    }

    #[test]
    fn spine_returns_same_chunk_handle() {
        let ctx = ResolverContext::live(Settings::default(), EditionRegistry::builtin());
        let a = ctx.spine(3);
        let b = ctx.spine(3);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), SpineState::Uninitialized);

        ctx.spine(1);
        let numbers: Vec<u32> = ctx.chunks().iter().map(|s| s.chunk()).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[tokio::test]
    async fn initialize_chunk_uses_configured_ports() {
        let fetcher = MemFetcher::new([("spine/spine_C01.xml", SPINE), ("w1818.xml", WITNESS)]);
        let ctx = ResolverContext::new(
            Settings::default(),
            EditionRegistry::builtin(),
            Box::new(fetcher),
            Box::new(SequentialIdGenerator::new("anchor-")),
        );

        let spine = ctx.initialize_chunk(1).await.unwrap();

        assert_eq!(spine.state(), SpineState::Ready);
        assert_eq!(spine.apparatuses()[0].id, "app1");
        assert!(Arc::ptr_eq(&spine, &ctx.spine(1)));
    }

    #[tokio::test]
    async fn replaying_context_serves_recorded_documents() {
        let dir = tempfile::tempdir().unwrap();
        write_cassette(
            &dir.path().join("fetch.cassette.yaml"),
            "fetch",
            vec![
                ("fetch", json!({"url": "spine/spine_C01.xml"}), json!({"Ok": SPINE})),
                ("fetch", json!({"url": "w1818.xml"}), json!({"Ok": WITNESS})),
            ],
        );

        let config = CassetteConfig::from_dir(dir.path());
        let ctx = ResolverContext::replaying_from(
            Settings::default(),
            EditionRegistry::builtin(),
            &config,
        )
        .unwrap();

        let spine = ctx.initialize_chunk(1).await.unwrap();
        let element = spine.apparatuses()[0].pointers[0].dereferenced.as_ref().unwrap();
        assert_eq!(element.text(), "Chapter 1");
    }

    #[test]
    #[should_panic(expected = "not configured in CassetteConfig")]
    fn unspecified_port_panics_with_clear_message() {
        let config = CassetteConfig::panic_on_unspecified();
        let ctx = ResolverContext::replaying_from(
            Settings::default(),
            EditionRegistry::builtin(),
            &config,
        )
        .unwrap();
        let _ = ctx.id_gen.generate_id();
    }
}
