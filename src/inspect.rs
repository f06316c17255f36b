//! Collection inspection (`codesim inspect`).

use std::io::Write;

use crate::error::{IndexError, Result};
use crate::models::StoredItem;
use crate::store::VectorStore;

/// Print the collection size and up to `limit` stored items.
pub async fn run<W: Write>(store: &VectorStore, limit: usize, out: &mut W) -> Result<usize> {
    let total = store.count().await?;
    writeln!(
        out,
        "--- The '{}' collection contains {} items. ---",
        store.collection(),
        total
    )?;
    if let Some(dims) = store.dims().await? {
        writeln!(out, "dims: {dims}")?;
    }

    let items = store.list(limit).await?;
    if items.is_empty() {
        return Ok(total);
    }

    writeln!(out)?;
    for item in &items {
        let first_line = item.document.lines().next().unwrap_or("").trim();
        writeln!(out, "{}", item.id)?;
        writeln!(out, "    {}", summary_line(item))?;
        writeln!(out, "    {first_line}")?;
    }
    if total > items.len() {
        writeln!(out, "... {} more", total - items.len())?;
    }
    Ok(total)
}

/// Print one item in full.
pub async fn show<W: Write>(store: &VectorStore, id: &str, out: &mut W) -> Result<()> {
    let item = store
        .get(id)
        .await?
        .ok_or_else(|| IndexError::NotFound(id.to_string()))?;

    writeln!(out, "id: {}", item.id)?;
    writeln!(out, "{}", summary_line(&item))?;
    writeln!(out, "dims: {}", item.vector.len())?;
    writeln!(out, "---")?;
    writeln!(out, "{}", item.document)?;
    Ok(())
}

fn summary_line(item: &StoredItem) -> String {
    let m = &item.metadata;
    format!(
        "{} {} in {} (lines {}-{})",
        m.kind,
        m.function_name.as_deref().unwrap_or("<anonymous>"),
        m.file_path,
        m.start_line,
        m.end_line
    )
}
