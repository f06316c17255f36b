//! Core data models for stored declarations and query results.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::extract::{DeclKind, DeclName, DeclarationRecord};

/// How a batch of items is written to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail on a colliding id.
    Insert,
    /// Insert or replace by id.
    #[default]
    Upsert,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(WriteMode::Insert),
            "upsert" => Ok(WriteMode::Upsert),
            other => Err(format!("unknown write mode '{other}' (use insert or upsert)")),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Insert => "insert",
            WriteMode::Upsert => "upsert",
        })
    }
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub file_path: String,
    /// `None` for anonymous declarations.
    pub function_name: Option<String>,
    pub kind: DeclKind,
    pub start_line: usize,
    pub end_line: usize,
}

/// A vector plus its document and metadata, keyed by composite id.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    pub metadata: ItemMetadata,
}

impl StoredItem {
    /// Build the stored form of a declaration extracted from `file_path`.
    pub fn from_declaration(file_path: &Path, decl: &DeclarationRecord, vector: Vec<f32>) -> Self {
        let file_path = file_path.display().to_string();
        Self {
            id: item_id(&file_path, &decl.name, decl.start_line),
            vector,
            document: decl.text.clone(),
            metadata: ItemMetadata {
                file_path,
                function_name: decl.name.as_deref().map(str::to_string),
                kind: decl.kind,
                start_line: decl.start_line,
                end_line: decl.end_line,
            },
        }
    }
}

/// Composite id: `<file>:<name>:<start_line>`.
pub fn item_id(file_path: &str, name: &DeclName, start_line: usize) -> String {
    format!("{}:{}:{}", file_path, name, start_line)
}

/// One k-NN result.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance, smaller is more similar.
    pub distance: f32,
    pub metadata: ItemMetadata,
    pub document: String,
}

/// Counts returned by a collection write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub inserted: usize,
    pub replaced: usize,
    /// Replaced rows whose document was byte-identical.
    pub unchanged: usize,
}

impl WriteStats {
    pub fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}
