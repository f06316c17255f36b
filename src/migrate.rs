use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema if it does not exist yet. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per named collection; dims is fixed by the first write
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dims INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            document TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            file_path TEXT NOT NULL,
            function_name TEXT,
            kind TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_file_path ON items(collection, file_path)")
        .execute(pool)
        .await?;

    Ok(())
}
