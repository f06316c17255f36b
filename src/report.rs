//! Human-readable rendering of declarations and neighbor lists.
//!
//! Everything here returns a `String`; callers decide where it goes.

use std::fmt::Write;

use crate::extract::DeclarationRecord;
use crate::models::{Neighbor, WriteMode, WriteStats};

/// `kind: name (lines a-b)` followed by the stripped source of each record.
pub fn format_declarations(header: &str, records: &[DeclarationRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{header}");
    for r in records {
        let _ = writeln!(
            out,
            "{}: {} (lines {}-{})",
            r.kind, r.name, r.start_line, r.end_line
        );
        let _ = writeln!(out, "{}", r.text.trim());
        out.push('\n');
    }
    out
}

/// Neighbor report for the declaration `name` in `file`.
///
/// With `skip_self`, the entry whose id equals `query_id` is left out.
pub fn format_neighbors(
    query_id: &str,
    file: &str,
    name: &str,
    neighbors: &[Neighbor],
    skip_self: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Similar to {name} ({file}) ---");

    let skip = skip_self.then_some(query_id);
    if write_entries(&mut out, neighbors, skip) == 0 {
        let _ = writeln!(out, "  (no similar declarations found)");
        out.push('\n');
    }
    out
}

/// Results of a free-text search against `collection`.
pub fn format_search_results(query: &str, collection: &str, hits: &[Neighbor]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Nearest to \"{query}\" in '{collection}' ---");
    write_entries(&mut out, hits, None);
    out
}

/// Numbered entries with indented source; returns how many were written.
fn write_entries(out: &mut String, neighbors: &[Neighbor], skip: Option<&str>) -> usize {
    let mut shown = 0;
    for n in neighbors {
        if skip == Some(n.id.as_str()) {
            continue;
        }
        shown += 1;
        let m = &n.metadata;
        let _ = writeln!(
            out,
            "{}. [distance {:.4}] {} :: {} ({}, lines {}-{})",
            shown,
            n.distance,
            m.file_path,
            m.function_name.as_deref().unwrap_or("<anonymous>"),
            m.kind,
            m.start_line,
            m.end_line
        );
        for line in n.document.trim_end().lines() {
            let _ = writeln!(out, "    {line}");
        }
        out.push('\n');
    }
    shown
}

/// One-line confirmation after a collection write.
pub fn format_write_stats(mode: WriteMode, collection: &str, stats: &WriteStats) -> String {
    format!(
        "{} {} items into '{}' (inserted: {}, replaced: {}, unchanged: {})",
        if mode == WriteMode::Insert { "Inserted" } else { "Upserted" },
        stats.total(),
        collection,
        stats.inserted,
        stats.replaced,
        stats.unchanged
    )
}
