//! `apparatus resolve` command.

use std::fmt::Write as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::ResolverContext;
use crate::spine::{Spine, SpineState, BACK_REFERENCE_ATTRIBUTE};

/// Parsed `resolve` arguments.
#[derive(Debug)]
pub struct Options<'a> {
    /// Chunk to initialize.
    pub chunk: u32,
    /// Print JSON instead of the text summary.
    pub json: bool,
    /// Directory receiving the rewritten documents.
    pub out: Option<&'a Path>,
}

#[derive(Debug, Serialize)]
struct ChunkReport {
    chunk: u32,
    url: String,
    state: SpineState,
    apparatuses: Vec<ApparatusReport>,
}

#[derive(Debug, Serialize)]
struct ApparatusReport {
    id: String,
    n: Option<u32>,
    pointers: Vec<PointerReport>,
}

#[derive(Debug, Serialize)]
struct PointerReport {
    group: String,
    edition: String,
    url: String,
    target: String,
    element: Option<String>,
    back_reference: Option<String>,
}

/// Execute the `resolve` command.
///
/// # Errors
///
/// Returns an error string if the chunk fails to initialize or the output
/// directory cannot be written.
pub async fn run(ctx: &ResolverContext, options: &Options<'_>) -> Result<(), String> {
    let spine = ctx.initialize_chunk(options.chunk).await.map_err(|e| e.to_string())?;
    let report = report(ctx, &spine);

    if options.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        print!("{}", render_text(&report));
    }

    if let Some(dir) = options.out {
        let written = write_documents(ctx, dir)?;
        eprintln!("Wrote {written} document(s) to {}", dir.display());
    }
    Ok(())
}

fn report(ctx: &ResolverContext, spine: &Spine) -> ChunkReport {
    let apparatuses = spine
        .apparatuses()
        .iter()
        .map(|app| ApparatusReport {
            id: app.id.clone(),
            n: app.n,
            pointers: app
                .pointers
                .iter()
                .map(|p| {
                    let element = p.dereferenced.as_ref();
                    PointerReport {
                        group: p.group_id.clone(),
                        edition: p.edition.code.clone(),
                        url: p.url.clone(),
                        target: p.target.to_string(),
                        element: element.and_then(|e| e.local_name()),
                        back_reference: element.and_then(|e| e.attribute(BACK_REFERENCE_ATTRIBUTE)),
                    }
                })
                .collect(),
        })
        .collect();

    ChunkReport {
        chunk: spine.chunk(),
        url: spine
            .contents()
            .map_or_else(|| ctx.settings.spine_url(spine.chunk()), |c| c.url.clone()),
        state: spine.state(),
        apparatuses,
    }
}

fn render_text(report: &ChunkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Chunk {} ({}): {} apparatus entr{}",
        report.chunk,
        report.url,
        report.apparatuses.len(),
        if report.apparatuses.len() == 1 { "y" } else { "ies" }
    );
    for app in &report.apparatuses {
        match app.n {
            Some(n) => {
                let _ = writeln!(out, "{} (n={n})", app.id);
            }
            None => {
                let _ = writeln!(out, "{}", app.id);
            }
        }
        for p in &app.pointers {
            let element = p.element.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  {:<6} {}#{} -> <{element}>", p.edition, p.url, p.target);
        }
    }
    out
}

/// Writes every cached document into `dir`, named by the last URL segment.
fn write_documents(ctx: &ResolverContext, dir: &Path) -> Result<usize, String> {
    let documents = ctx.cache.documents();

    let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
    let mut planned = Vec::with_capacity(documents.len());
    for (url, document) in &documents {
        let relative =
            output_path(url).ok_or_else(|| format!("Cannot derive a file name from {url}"))?;
        if let Some(first) = claimed.insert(relative.clone(), url) {
            return Err(format!(
                "{first} and {url} would both be written to {}",
                dir.join(&relative).display()
            ));
        }
        planned.push((url, document, dir.join(relative)));
    }

    for (url, document, path) in planned {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
        let xml = document.read().map_err(|e| format!("Document lock poisoned: {e}"))?.to_xml();
        std::fs::write(&path, xml)
            .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        tracing::debug!(url = %url, path = %path.display(), "wrote document");
    }
    Ok(documents.len())
}

/// Relative output path for a document URL: the scheme is dropped, and empty,
/// `.` and `..` segments are skipped so every file lands under `--out`.
fn output_path(url: &str) -> Option<PathBuf> {
    let path = url.split_once("://").map_or(url, |(_, rest)| rest);
    let relative: PathBuf =
        path.split('/').filter(|segment| !matches!(*segment, "" | "." | "..")).collect();
    relative.components().next().is_some().then_some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::live::id_gen::SequentialIdGenerator;
    use crate::config::Settings;
    use crate::registry::EditionRegistry;
    use crate::test_support::MemFetcher;

    const SPINE: &str = r##"<TEI><body>
        <app xml:id="app1" n="2"><rdgGrp xml:id="g1">
          <rdg wit="#f1818"><ptr target="witness/w1818.xml#p1"/></rdg>
          <rdg wit="#fThom"><ptr target="witness/wThom.xml#string-range(//tei:body/tei:p,0,4)"/></rdg>
        </rdgGrp></app>
    </body></TEI>"##;

    fn context() -> ResolverContext {
        ResolverContext::new(
            Settings::default(),
            EditionRegistry::builtin(),
            Box::new(MemFetcher::new([
                ("spine/spine_C01.xml", SPINE),
                ("witness/w1818.xml", r#"<TEI><body><p xml:id="p1">Ice</p></body></TEI>"#),
                ("witness/wThom.xml", "<TEI><body><p>Ice</p></body></TEI>"),
            ])),
            Box::new(SequentialIdGenerator::new("anchor-")),
        )
    }

    #[tokio::test]
    async fn report_describes_resolved_pointers() {
        let ctx = context();
        let spine = ctx.initialize_chunk(1).await.unwrap();
        let report = report(&ctx, &spine);

        assert_eq!(report.url, "spine/spine_C01.xml");
        assert_eq!(report.apparatuses[0].n, Some(2));
        let thom = &report.apparatuses[0].pointers[1];
        assert_eq!(thom.edition, "Thom");
        assert_eq!(thom.target, "anchor-0");
        assert_eq!(thom.element.as_deref(), Some("p"));
        assert_eq!(thom.back_reference.as_deref(), Some("app1"));

        let text = render_text(&report);
        assert!(text.starts_with("Chunk 1 (spine/spine_C01.xml): 1 apparatus entry"));
        assert!(text.contains("app1 (n=2)"));
        assert!(text.contains("  Thom   witness/wThom.xml#anchor-0 -> <p>"));
    }

    #[tokio::test]
    async fn json_report_carries_state() {
        let ctx = context();
        let spine = ctx.initialize_chunk(1).await.unwrap();
        let value = serde_json::to_value(report(&ctx, &spine)).unwrap();

        assert_eq!(value["state"], "ready");
        assert_eq!(value["apparatuses"][0]["pointers"][0]["target"], "p1");
    }

    #[tokio::test]
    async fn writes_rewritten_documents() {
        let ctx = context();
        ctx.initialize_chunk(1).await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let written = write_documents(&ctx, dir.path()).unwrap();

        assert_eq!(written, 3);
        let spine = std::fs::read_to_string(dir.path().join("spine/spine_C01.xml")).unwrap();
        assert!(spine.contains(r#"target="witness/wThom.xml#anchor-0""#));
        let thom = std::fs::read_to_string(dir.path().join("witness/wThom.xml")).unwrap();
        assert!(thom.contains(r#"xml:id="anchor-0""#));
        assert!(thom.contains(r#"data-app="app1""#));
    }

    fn two_witness_context(first: &str, second: &str) -> ResolverContext {
        let spine = format!(
            r##"<TEI><body><app xml:id="app1"><rdgGrp xml:id="g1">
                <rdg wit="#f1818"><ptr target="{first}#p1"/></rdg>
                <rdg wit="#f1823"><ptr target="{second}#p1"/></rdg>
            </rdgGrp></app></body></TEI>"##
        );
        ResolverContext::new(
            Settings::default(),
            EditionRegistry::builtin(),
            Box::new(MemFetcher::new([
                ("spine/spine_C01.xml", spine.as_str()),
                (first, r#"<TEI><body><p xml:id="p1">1818</p></body></TEI>"#),
                (second, r#"<TEI><body><p xml:id="p1">1823</p></body></TEI>"#),
            ])),
            Box::new(SequentialIdGenerator::new("anchor-")),
        )
    }

    #[tokio::test]
    async fn same_file_name_in_different_directories_is_kept_apart() {
        let ctx = two_witness_context("1818/C01.xml", "1823/C01.xml");
        ctx.initialize_chunk(1).await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(write_documents(&ctx, dir.path()).unwrap(), 3);

        let first = std::fs::read_to_string(dir.path().join("1818/C01.xml")).unwrap();
        let second = std::fs::read_to_string(dir.path().join("1823/C01.xml")).unwrap();
        assert!(first.contains(">1818<"));
        assert!(second.contains(">1823<"));
    }

    #[tokio::test]
    async fn colliding_output_paths_are_an_error() {
        let ctx = two_witness_context("http://host/C01.xml", "host/C01.xml");
        ctx.initialize_chunk(1).await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = write_documents(&ctx, dir.path()).unwrap_err();

        assert!(err.contains("host/C01.xml and http://host/C01.xml"), "{err}");
        assert!(!dir.path().join("host").exists());
    }

    #[test]
    fn output_path_drops_scheme_and_dot_segments() {
        assert_eq!(
            output_path("https://example.org/a/b.xml"),
            Some(PathBuf::from("example.org/a/b.xml"))
        );
        assert_eq!(output_path("../w/./x.xml"), Some(PathBuf::from("w/x.xml")));
        assert_eq!(output_path("/abs//y.xml"), Some(PathBuf::from("abs/y.xml")));
        assert_eq!(output_path("file://"), None);
    }
}
