//! Library pipeline against the XML fixtures in `tests/fixtures/`.

use apparatus::config::Settings;
use apparatus::context::ResolverContext;
use apparatus::error::{DocumentError, IntegrityError, ResolveError};
use apparatus::model::Target;
use apparatus::registry::EditionRegistry;
use apparatus::spine::{SpineState, BACK_REFERENCE_ATTRIBUTE};

const WITNESS_DIR: &str = "tests/fixtures/witness";

fn context() -> ResolverContext {
    let settings =
        Settings { spine_base_url: "tests/fixtures/spine".into(), ..Settings::default() };
    ResolverContext::live(settings, EditionRegistry::builtin())
}

fn witness(name: &str) -> String {
    format!("{WITNESS_DIR}/{name}")
}

#[tokio::test]
async fn chunk_one_resolves_against_fixture_witnesses() {
    let ctx = context();
    let spine = ctx.initialize_chunk(1).await.expect("chunk 1 should resolve");

    assert_eq!(spine.state(), SpineState::Ready);
    let apps = spine.apparatuses();
    let ids: Vec<&str> = apps.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["C01_app1", "C01_app2"]);

    // The 1831 range has no <lg> to anchor to and is dropped.
    assert_eq!(apps[0].pointers.len(), 3);
    assert_eq!(apps[1].pointers.len(), 2);

    let thom: Vec<&Target> = apps
        .iter()
        .flat_map(|a| &a.pointers)
        .filter(|p| p.edition.code == "Thom")
        .map(|p| &p.target)
        .collect();
    assert_eq!(thom, [&Target::Id("anchor-0".into()), &Target::Id("anchor-1".into())]);

    for app in apps {
        for pointer in &app.pointers {
            let element = pointer.dereferenced.as_ref().expect("pointer should be resolved");
            assert_eq!(element.attribute(BACK_REFERENCE_ATTRIBUTE).as_deref(), Some(app.id.as_str()));
        }
    }

    // spine, 1818, 1823, Thom, 1831
    assert_eq!(ctx.cache.fetch_count(), 5);
}

#[tokio::test]
async fn rewritten_targets_are_reflected_in_the_spine_document() {
    let ctx = context();
    let spine = ctx.initialize_chunk(1).await.unwrap();

    let xml = spine.contents().unwrap().document.read().unwrap().to_xml();
    let expected = format!(r#"target="{}#anchor-0""#, witness("fThom_C01.xml"));
    assert!(xml.contains(&expected), "spine should carry {expected}");
    assert!(xml.contains("string-range(//tei:body/tei:div/tei:lg,0,17)"));
}

#[tokio::test]
async fn chunks_share_the_document_cache() {
    let ctx = context();
    ctx.initialize_chunk(1).await.unwrap();
    let before = ctx.cache.fetch_count();

    let second = ctx.initialize_chunk(2).await.unwrap();

    // Only the chunk 2 spine is new.
    assert_eq!(ctx.cache.fetch_count(), before + 1);

    // The later chunk's claim on a shared element wins.
    let claimed = second.apparatuses()[0].pointers[0].dereferenced.as_ref().unwrap();
    assert_eq!(claimed.url, witness("f1818_C01.xml"));
    assert_eq!(claimed.attribute(BACK_REFERENCE_ATTRIBUTE).as_deref(), Some("C02_app1"));
}

#[tokio::test]
async fn missing_witness_aborts_the_chunk() {
    let ctx = context();
    let err = ctx.initialize_chunk(3).await.unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Document(DocumentError::Fetch { ref url, .. }) if *url == witness("f1818_C03.xml")
    ));
    assert_eq!(ctx.spine(3).state(), SpineState::Uninitialized);
}

#[tokio::test]
async fn missing_anchor_aborts_the_chunk() {
    let ctx = context();
    let err = ctx.initialize_chunk(4).await.unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Integrity(IntegrityError::MissingAnchor { ref id, .. }) if id == "c04_missing"
    ));
}

#[tokio::test]
async fn missing_spine_aborts_the_chunk() {
    let ctx = context();
    let err = ctx.initialize_chunk(5).await.unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Document(DocumentError::Fetch { ref url, .. })
            if url == "tests/fixtures/spine/spine_C05.xml"
    ));
}
