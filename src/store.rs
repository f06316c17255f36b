//! Persistent vector collection backed by `SQLite`.
//!
//! A [`VectorStore`] is one named collection inside `<data_dir>/codesim.sqlite`.
//! Vectors are stored as little-endian f32 BLOBs and searched by an exact
//! cosine-distance scan in Rust.
//!
//! # Guarantees
//!
//! - Writes of one batch are atomic (single transaction).
//! - [`WriteMode::Upsert`] replaces by id, last write wins.
//! - [`WriteMode::Insert`] rejects the whole batch on the first colliding id
//!   with [`IndexError::DuplicateId`]; nothing is duplicated.
//! - The first write fixes the collection's dimensionality.
//! - Query results are ordered by distance ascending, then id ascending, so
//!   ties resolve deterministically.

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{IndexError, Result};
use crate::extract::DeclKind;
use crate::migrate;
use crate::models::{ItemMetadata, Neighbor, StoredItem, WriteMode, WriteStats};

/// Handle to one collection. Call [`VectorStore::close`] when done.
pub struct VectorStore {
    pool: SqlitePool,
    collection: String,
}

impl VectorStore {
    /// Open `collection` inside `data_dir`, creating directory, database,
    /// schema, and collection as needed.
    pub async fn open(data_dir: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(data_dir).await?;
        migrate::run_migrations(&pool).await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, dims, created_at) VALUES (?, NULL, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await?;

        tracing::debug!(data_dir = %data_dir.display(), collection, "opened collection");

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Dimensionality fixed by the first write, if any.
    pub async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }

    /// Write a batch of items using `mode`.
    pub async fn write(&self, mode: WriteMode, items: &[StoredItem]) -> Result<WriteStats> {
        let mut stats = WriteStats::default();
        let Some(first) = items.first() else {
            return Ok(stats);
        };

        let expected = self.dims().await?.unwrap_or(first.vector.len());
        if let Some(bad) = items.iter().find(|i| i.vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        if mode == WriteMode::Insert {
            let mut seen = HashSet::new();
            if let Some(dup) = items.iter().find(|i| !seen.insert(i.id.as_str())) {
                return Err(IndexError::DuplicateId(dup.id.clone()));
            }
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for item in items {
            let hash = content_hash(&item.document);
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT content_hash FROM items WHERE collection = ? AND id = ?",
            )
            .bind(&self.collection)
            .bind(&item.id)
            .fetch_optional(&mut *tx)
            .await?;

            match (&existing, mode) {
                // dropping tx rolls the batch back
                (Some(_), WriteMode::Insert) => return Err(IndexError::DuplicateId(item.id.clone())),
                (Some(old), WriteMode::Upsert) => {
                    stats.replaced += 1;
                    if *old == hash {
                        stats.unchanged += 1;
                    }
                }
                (None, _) => stats.inserted += 1,
            }

            sqlx::query(
                r#"
                INSERT INTO items (collection, id, embedding, document, content_hash,
                                   file_path, function_name, kind, start_line, end_line, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    document = excluded.document,
                    content_hash = excluded.content_hash,
                    file_path = excluded.file_path,
                    function_name = excluded.function_name,
                    kind = excluded.kind,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.collection)
            .bind(&item.id)
            .bind(vec_to_blob(&item.vector))
            .bind(&item.document)
            .bind(&hash)
            .bind(&item.metadata.file_path)
            .bind(&item.metadata.function_name)
            .bind(item.metadata.kind.as_str())
            .bind(item.metadata.start_line as i64)
            .bind(item.metadata.end_line as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE collections SET dims = ? WHERE name = ? AND dims IS NULL")
            .bind(expected as i64)
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            collection = %self.collection,
            %mode,
            inserted = stats.inserted,
            replaced = stats.replaced,
            "wrote items"
        );
        Ok(stats)
    }

    /// The `k` stored items nearest to `vector`.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        match self.dims().await? {
            None => return Ok(Vec::new()),
            Some(dims) if dims != vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                })
            }
            Some(_) => {}
        }

        let rows = sqlx::query("SELECT * FROM items WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        let mut neighbors = rows
            .iter()
            .map(|row| {
                let item = row_to_item(row)?;
                let distance = cosine_distance(vector, &item.vector);
                Ok(Neighbor {
                    // NaN ranks after every real distance
                    distance: if distance.is_nan() { f32::INFINITY } else { distance },
                    id: item.id,
                    metadata: item.metadata,
                    document: item.document,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    pub async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredItem>> {
        let row = sqlx::query("SELECT * FROM items WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    /// Items ordered by file and line, at most `limit`.
    pub async fn list(&self, limit: usize) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE collection = ? ORDER BY file_path, start_line, id LIMIT ?",
        )
        .bind(&self.collection)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn row_to_item(row: &SqliteRow) -> Result<StoredItem> {
    let kind: String = row.try_get("kind")?;
    let kind = DeclKind::parse(&kind).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "kind".into(),
        source: format!("unknown declaration kind '{kind}'").into(),
    })?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    let start_line: i64 = row.try_get("start_line")?;
    let end_line: i64 = row.try_get("end_line")?;

    Ok(StoredItem {
        id: row.try_get("id")?,
        vector: blob_to_vec(&blob),
        document: row.try_get("document")?,
        metadata: ItemMetadata {
            file_path: row.try_get("file_path")?,
            function_name: row.try_get("function_name")?,
            kind,
            start_line: start_line as usize,
            end_line: end_line as usize,
        },
    })
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, vector: Vec<f32>, document: &str) -> StoredItem {
        StoredItem {
            id: id.to_string(),
            vector,
            document: document.to_string(),
            metadata: ItemMetadata {
                file_path: "a.py".into(),
                function_name: Some(id.to_string()),
                kind: DeclKind::Function,
                start_line: 1,
                end_line: 2,
            },
        }
    }

    async fn open_tmp() -> (tempfile::TempDir, VectorStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&tmp.path().join("vector_db"), "project_code")
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn upsert_last_write_wins() {
        let (_tmp, store) = open_tmp().await;

        let first = store
            .write(WriteMode::Upsert, &[item("a.py:foo:1", vec![1.0, 0.0], "T1")])
            .await
            .unwrap();
        assert_eq!(first.inserted, 1);

        let second = store
            .write(WriteMode::Upsert, &[item("a.py:foo:1", vec![0.0, 1.0], "T2")])
            .await
            .unwrap();
        assert_eq!((second.inserted, second.replaced, second.unchanged), (0, 1, 0));

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get("a.py:foo:1").await.unwrap().unwrap();
        assert_eq!(stored.document, "T2");
        assert_eq!(stored.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn upsert_same_content_counts_unchanged() {
        let (_tmp, store) = open_tmp().await;
        let batch = [item("x", vec![1.0, 1.0], "same")];
        store.write(WriteMode::Upsert, &batch).await.unwrap();
        let stats = store.write(WriteMode::Upsert, &batch).await.unwrap();
        assert_eq!(stats.unchanged, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_existing_id() {
        let (_tmp, store) = open_tmp().await;
        store
            .write(WriteMode::Insert, &[item("a.py:foo:1", vec![1.0, 0.0], "T1")])
            .await
            .unwrap();

        let err = store
            .write(
                WriteMode::Insert,
                &[
                    item("a.py:bar:5", vec![0.5, 0.5], "new"),
                    item("a.py:foo:1", vec![0.0, 1.0], "T2"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(id) if id == "a.py:foo:1"));

        // whole batch rolled back
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get("a.py:bar:5").await.unwrap().is_none());
        assert_eq!(store.get("a.py:foo:1").await.unwrap().unwrap().document, "T1");
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_within_batch() {
        let (_tmp, store) = open_tmp().await;
        let err = store
            .write(
                WriteMode::Insert,
                &[item("dup", vec![1.0], "a"), item("dup", vec![2.0], "b")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_is_nearest_neighbor() {
        let (_tmp, store) = open_tmp().await;
        let items = [
            item("foo", vec![1.0, 0.2, 0.0], "def foo(): ..."),
            item("bar", vec![0.1, 1.0, 0.3], "def bar(): ..."),
            item("baz", vec![0.0, 0.1, 1.0], "def baz(): ..."),
        ];
        store.write(WriteMode::Upsert, &items).await.unwrap();

        for it in &items {
            let hits = store.query(&it.vector, 3).await.unwrap();
            assert_eq!(hits.len(), 3);
            assert_eq!(hits[0].id, it.id);
            assert!(hits[0].distance < 1e-6);
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[tokio::test]
    async fn query_respects_k_and_breaks_ties_by_id() {
        let (_tmp, store) = open_tmp().await;
        store
            .write(
                WriteMode::Upsert,
                &[
                    item("c", vec![1.0, 0.0], "c"),
                    item("a", vec![2.0, 0.0], "a"),
                    item("b", vec![0.0, 1.0], "b"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);

        assert!(store.query(&[1.0, 0.0], 0).await.unwrap().is_empty());
        assert_eq!(store.query(&[1.0, 0.0], 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn dimensionality_is_fixed_by_first_write() {
        let (_tmp, store) = open_tmp().await;
        assert_eq!(store.dims().await.unwrap(), None);
        assert!(store.query(&[1.0], 3).await.unwrap().is_empty());

        store
            .write(WriteMode::Upsert, &[item("a", vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        assert_eq!(store.dims().await.unwrap(), Some(2));

        let err = store
            .write(WriteMode::Upsert, &[item("b", vec![1.0, 0.0, 0.0], "b")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(store.query(&[1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("vector_db");

        let store = VectorStore::open(&dir, "project_code").await.unwrap();
        store
            .write(WriteMode::Upsert, &[item("keep", vec![0.3, 0.4], "kept")])
            .await
            .unwrap();
        store.close().await;

        let store = VectorStore::open(&dir, "project_code").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.query(&[0.3, 0.4], 1).await.unwrap();
        assert_eq!(hits[0].id, "keep");
        assert_eq!(hits[0].document, "kept");
        store.close().await;
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("vector_db");

        let a = VectorStore::open(&dir, "alpha").await.unwrap();
        a.write(WriteMode::Upsert, &[item("x", vec![1.0], "x")])
            .await
            .unwrap();
        a.close().await;

        let b = VectorStore::open(&dir, "beta").await.unwrap();
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.get("x").await.unwrap().is_none());
        b.close().await;
    }

    #[tokio::test]
    async fn list_orders_by_file_and_line() {
        let (_tmp, store) = open_tmp().await;
        let mut late = item("late", vec![1.0], "late");
        late.metadata.start_line = 40;
        let mut early = item("early", vec![1.0], "early");
        early.metadata.start_line = 3;
        store.write(WriteMode::Upsert, &[late, early]).await.unwrap();

        let listed = store.list(10).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
        assert_eq!(store.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nan_vectors_rank_last_without_panicking() {
        let (_tmp, store) = open_tmp().await;
        store
            .write(
                WriteMode::Upsert,
                &[
                    item("broken", vec![f32::NAN, 0.0], "broken"),
                    item("far", vec![0.0, 1.0], "far"),
                    item("near", vec![1.0, 0.1], "near"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["near", "far", "broken"]);
        assert_eq!(hits[2].distance, f32::INFINITY);
    }
}
