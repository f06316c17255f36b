//! Error types for codesim.
//!
//! Every failure a run can hit maps to one [`IndexError`] variant, and every
//! variant maps to a process exit code category via [`IndexError::exit_code`].

use std::path::PathBuf;

/// Errors that can occur while indexing, storing, or querying declarations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The source path does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// IO error reading a source file.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension is not `.py` or `.java`.
    #[error("unsupported file type: {} (expected .py or .java)", .0.display())]
    UnsupportedFileType(PathBuf),

    /// Tree-sitter setup failed (grammar or query).
    #[error("parse failed: {0}")]
    Parse(String),

    /// Required API credential is not present in the environment.
    #[error("{0} environment variable not set")]
    MissingCredential(String),

    /// The embedding client could not be constructed.
    #[error("embedding client error: {0}")]
    Client(String),

    /// The remote embedding call failed.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// The embedding response did not line up with the request batch.
    #[error("embedding response mismatch: {0}")]
    EmbeddingMismatch(String),

    /// `SQLite` error from the vector store.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Insert-only write hit an id that is already stored.
    #[error("duplicate id in insert-only write: {0}")]
    DuplicateId(String),

    /// A vector's length differs from the collection's dimensionality.
    #[error("dimension mismatch: collection has {expected} dims, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Lookup by id found nothing.
    #[error("no item with id {0}")]
    NotFound(String),

    /// Writing the report failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}

impl IndexError {
    /// Process exit code for this error's category.
    ///
    /// `2` is left to clap for usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            IndexError::FileNotFound(_) | IndexError::Io { .. } => 3,
            IndexError::UnsupportedFileType(_) => 4,
            IndexError::MissingCredential(_) | IndexError::Client(_) => 5,
            IndexError::Embedding(_) | IndexError::EmbeddingMismatch(_) => 6,
            IndexError::Store(_)
            | IndexError::DuplicateId(_)
            | IndexError::DimensionMismatch { .. }
            | IndexError::NotFound(_) => 7,
            IndexError::Parse(_) | IndexError::Config(_) | IndexError::Output(_) => 1,
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
