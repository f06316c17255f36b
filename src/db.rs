//! `SQLite` connection setup for the vector store.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Database file created inside the data directory.
pub const DB_FILE: &str = "codesim.sqlite";

pub fn db_file(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

/// Open (creating if missing) the database inside `data_dir`.
pub async fn connect(data_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(data_dir).map_err(|e| IndexError::Io {
        path: data_dir.to_path_buf(),
        source: e,
    })?;

    let options = SqliteConnectOptions::new()
        .filename(db_file(data_dir))
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // Single connection: writes and reads of one run are strictly sequential.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
