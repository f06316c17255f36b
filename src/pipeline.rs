//! Single-file indexing pipeline.
//!
//! ```text
//! load → detect → extract → embed (one batch) → write → k-NN per declaration
//! ```
//!
//! The embedder and store are passed in by the caller; the pipeline owns
//! neither. If embedding fails nothing is written and nothing is queried.

use std::io::Write;
use std::path::Path;

use crate::embedding::{check_batch, Embedder, InputType};
use crate::error::Result;
use crate::extract::{extract_declarations, DeclarationRecord};
use crate::lang::Language;
use crate::models::{StoredItem, WriteMode, WriteStats};
use crate::report;
use crate::source;
use crate::store::VectorStore;

/// Per-run knobs, resolved from config and CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub write_mode: WriteMode,
    /// Neighbors requested per declaration, including the self-match.
    pub neighbors: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Upsert,
            neighbors: 3,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub declarations: usize,
    pub stats: WriteStats,
}

/// Load, detect, and extract, printing the declaration listing.
///
/// This is the whole run in dry-run mode.
pub fn extract_file<W: Write>(path: &Path, out: &mut W) -> Result<Vec<DeclarationRecord>> {
    let code = source::load_bytes(path)?;
    let lang = Language::from_path(path)?;
    let records = extract_declarations(&code, lang)?;

    let header = format!("--- Found in {} Code ({}) ---", lang.name(), path.display());
    write!(out, "{}", report::format_declarations(&header, &records))?;

    if records.is_empty() {
        writeln!(out, "No declarations found in {}; nothing to index.", path.display())?;
    }
    Ok(records)
}

/// Index one file and report each declaration's nearest neighbors.
pub async fn index_file<W: Write>(
    path: &Path,
    embedder: &dyn Embedder,
    store: &VectorStore,
    options: &IndexOptions,
    out: &mut W,
) -> Result<IndexSummary> {
    let records = extract_file(path, out)?;
    if records.is_empty() {
        return Ok(IndexSummary::default());
    }

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let vectors = embedder.embed(&texts, InputType::Document).await?;
    check_batch(texts.len(), &vectors)?;

    let dims = vectors.first().map_or(0, Vec::len);
    writeln!(
        out,
        "Embedded {} declarations with {} (dims {})",
        vectors.len(),
        embedder.model_name(),
        dims
    )?;

    let items: Vec<StoredItem> = records
        .iter()
        .zip(vectors)
        .map(|(record, vector)| StoredItem::from_declaration(path, record, vector))
        .collect();

    let stats = store.write(options.write_mode, &items).await?;
    writeln!(
        out,
        "{}",
        report::format_write_stats(options.write_mode, store.collection(), &stats)
    )?;
    writeln!(out)?;

    let file = path.display().to_string();
    for (record, item) in records.iter().zip(&items) {
        let neighbors = store.query(&item.vector, options.neighbors).await?;
        tracing::debug!(id = %item.id, hits = neighbors.len(), "queried neighbors");
        write!(
            out,
            "{}",
            report::format_neighbors(&item.id, &file, &record.name.to_string(), &neighbors, true)
        )?;
    }

    Ok(IndexSummary {
        declarations: records.len(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Letter-frequency vectors: deterministic and distinct for distinct text.
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }

        async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
            assert_eq!(input_type, InputType::Document);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 27];
                    for c in t.chars() {
                        match c {
                            'a'..='z' => v[(c as u8 - b'a') as usize] += 1.0,
                            _ => v[26] += 1.0,
                        }
                    }
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
            Err(IndexError::Embedding("quota exhausted".into()))
        }
    }

    /// Returns one vector too few.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }

        async fn embed(&self, texts: &[String], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]; texts.len() - 1])
        }
    }

    const TWO_FUNCTIONS: &str = r#"import math


def foo(values):
    """Sum of squares."""
    total = 0
    for v in values:
        total += v * v
    return total


def bar(name):
    greeting = "hello, " + name
    print(greeting)
    return greeting


if __name__ == "__main__":
    print(foo([1, 2, 3]))
    bar("world")
"#;

    async fn setup(file_name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf, VectorStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(file_name);
        std::fs::write(&path, contents).unwrap();
        let store = VectorStore::open(&tmp.path().join("vector_db"), "project_code")
            .await
            .unwrap();
        (tmp, path, store)
    }

    #[tokio::test]
    async fn two_functions_end_to_end() {
        let (_tmp, path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        assert_eq!(TWO_FUNCTIONS.lines().count(), 20);

        let embedder = LetterEmbedder::new();
        let options = IndexOptions {
            write_mode: WriteMode::Upsert,
            neighbors: 2,
        };
        let mut out = Vec::new();
        let summary = index_file(&path, &embedder, &store, &options, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.declarations, 2);
        assert_eq!(summary.stats.inserted, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("function: foo (lines 4-9)"));
        assert!(text.contains("function: bar (lines 12-15)"));

        let foo_report = text
            .split("--- Similar to foo")
            .nth(1)
            .and_then(|s| s.split("--- Similar to bar").next())
            .unwrap();
        assert!(foo_report.contains(":: bar (function, lines 12-15)"));
        assert!(!foo_report.contains(":: foo ("));

        // querying with foo's own vector puts foo first and bar second
        let foo = store
            .list(10)
            .await
            .unwrap()
            .into_iter()
            .find(|i| i.metadata.function_name.as_deref() == Some("foo"))
            .unwrap();
        let hits = store.query(&foo.vector, 2).await.unwrap();
        assert_eq!(hits[0].id, foo.id);
        assert_eq!(hits[1].metadata.function_name.as_deref(), Some("bar"));
        store.close().await;
    }

    #[tokio::test]
    async fn rerun_with_upsert_does_not_duplicate() {
        let (_tmp, path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        let embedder = LetterEmbedder::new();
        let options = IndexOptions::default();

        index_file(&path, &embedder, &store, &options, &mut Vec::new())
            .await
            .unwrap();
        let second = index_file(&path, &embedder, &store, &options, &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(second.stats.replaced, 2);
        assert_eq!(second.stats.unchanged, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerun_with_insert_is_rejected() {
        let (_tmp, path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        let embedder = LetterEmbedder::new();
        let options = IndexOptions {
            write_mode: WriteMode::Insert,
            neighbors: 3,
        };

        index_file(&path, &embedder, &store, &options, &mut Vec::new())
            .await
            .unwrap();
        let err = index_file(&path, &embedder, &store, &options, &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::DuplicateId(_)));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let (_tmp, path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        let mut out = Vec::new();
        let err = index_file(&path, &FailingEmbedder, &store, &IndexOptions::default(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!String::from_utf8(out).unwrap().contains("Similar to"));
    }

    #[tokio::test]
    async fn short_embedding_response_writes_nothing() {
        let (_tmp, path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        let err = index_file(
            &path,
            &ShortEmbedder,
            &store,
            &IndexOptions::default(),
            &mut Vec::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingMismatch(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unsupported_extension_writes_nothing() {
        let (_tmp, path, store) = setup("notes.txt", "def foo():\n    pass\n").await;
        let embedder = LetterEmbedder::new();
        let err = index_file(&path, &embedder, &store, &IndexOptions::default(), &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::UnsupportedFileType(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_file_fails_before_parsing() {
        let (tmp, _path, store) = setup("sample.py", TWO_FUNCTIONS).await;
        let missing = tmp.path().join("missing.py");
        let mut out = Vec::new();
        let err = index_file(&missing, &FailingEmbedder, &store, &IndexOptions::default(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::FileNotFound(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn no_declarations_is_success() {
        let (_tmp, path, store) = setup("script.py", "print('hi')\n").await;
        let embedder = LetterEmbedder::new();
        let mut out = Vec::new();
        let summary = index_file(&path, &embedder, &store, &IndexOptions::default(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary, IndexSummary::default());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(String::from_utf8(out).unwrap().contains("No declarations found"));
    }

    #[tokio::test]
    async fn java_file_indexes_methods_and_constructors() {
        let source = "class Box {\n  Box() {}\n  int size() { return 0; }\n  void clear() {}\n}\n";
        let (_tmp, path, store) = setup("Box.java", source).await;
        let embedder = LetterEmbedder::new();
        let summary = index_file(&path, &embedder, &store, &IndexOptions::default(), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.declarations, 3);
        let items = store.list(10).await.unwrap();
        let kinds: Vec<&str> = items.iter().map(|i| i.metadata.kind.as_str()).collect();
        assert_eq!(kinds, ["constructor", "method", "method"]);
        let expected_id = format!("{}:Box:2", path.display());
        assert!(items.iter().any(|i| i.id == expected_id));
    }
}
