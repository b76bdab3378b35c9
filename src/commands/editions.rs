//! `apparatus editions` command.

use std::collections::BTreeSet;

use crate::registry::EditionRegistry;

/// Execute the `editions` command.
///
/// Prints a table of registry entries, optionally limited to the editions
/// providing `chunk`.
pub fn run(registry: &EditionRegistry, chunk: Option<u32>) {
    print!("{}", render(registry, chunk));
}

fn render(registry: &EditionRegistry, chunk: Option<u32>) -> String {
    let editions = match chunk {
        Some(chunk) => registry.providing(chunk),
        None => registry.iter().cloned().collect(),
    };
    if editions.is_empty() {
        return "No editions found.\n".to_string();
    }

    let rows: Vec<(&str, &str, String)> = editions
        .iter()
        .map(|e| (e.code.as_str(), e.name.as_str(), format_chunks(&e.chunks)))
        .collect();

    // Calculate column widths.
    let code_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(4).max(4);
    let name_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(4).max(4);

    let mut out = format!("{:<code_width$}  {:<name_width$}  CHUNKS\n", "CODE", "NAME");
    out.push_str(&format!("{:-<code_width$}  {:-<name_width$}  {:-<6}\n", "", "", ""));
    for (code, name, chunks) in &rows {
        out.push_str(&format!("{code:<code_width$}  {name:<name_width$}  {chunks}\n"));
    }
    out.push_str(&format!("\n{} edition(s).\n", rows.len()));
    out
}

/// Compresses a chunk set into ranges: `{1,2,3,7}` becomes `1-3, 7`.
fn format_chunks(chunks: &BTreeSet<u32>) -> String {
    let mut spans: Vec<(u32, u32)> = Vec::new();
    for &chunk in chunks {
        match spans.last_mut() {
            Some((_, end)) if *end + 1 == chunk => *end = chunk,
            _ => spans.push((chunk, chunk)),
        }
    }
    if spans.is_empty() {
        return "-".to_string();
    }
    spans
        .iter()
        .map(|&(start, end)| if start == end { start.to_string() } else { format!("{start}-{end}") })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_sets_collapse_to_ranges() {
        assert_eq!(format_chunks(&BTreeSet::from([1, 2, 3, 7, 9, 10])), "1-3, 7, 9-10");
        assert_eq!(format_chunks(&BTreeSet::new()), "-");
    }

    #[test]
    fn lists_all_builtin_editions() {
        let out = render(&EditionRegistry::builtin(), None);
        assert!(out.starts_with("CODE"));
        assert!(out.contains("Thomas copy"));
        assert!(out.contains("5 edition(s)."));
    }

    #[test]
    fn chunk_filter_excludes_manuscript_before_seven() {
        let out = render(&EditionRegistry::builtin(), Some(3));
        assert!(!out.contains("Manuscript notebooks"));
        assert!(out.contains("4 edition(s)."));

        let out = render(&EditionRegistry::builtin(), Some(7));
        assert!(out.contains("MS"));
        assert!(out.contains("7-33"));
    }

    #[test]
    fn unknown_chunk_reports_nothing() {
        assert_eq!(render(&EditionRegistry::builtin(), Some(99)), "No editions found.\n");
    }
}
