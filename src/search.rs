//! Free-text similarity search (`codesim search`).

use std::io::Write;

use crate::embedding::{self, Embedder};
use crate::error::Result;
use crate::report;
use crate::store::VectorStore;

/// Embed `query` as a search query and print its `k` nearest declarations.
///
/// Returns the number of hits.
pub async fn run<W: Write>(
    query: &str,
    k: usize,
    embedder: &dyn Embedder,
    store: &VectorStore,
    out: &mut W,
) -> Result<usize> {
    if query.trim().is_empty() {
        writeln!(out, "No results.")?;
        return Ok(0);
    }

    let vector = embedding::embed_query(embedder, query).await?;
    let hits = store.query(&vector, k).await?;

    if hits.is_empty() {
        writeln!(out, "No results.")?;
        return Ok(0);
    }

    write!(
        out,
        "{}",
        report::format_search_results(query.trim(), store.collection(), &hits)
    )?;
    Ok(hits.len())
}
