//! Declaration extraction via tree-sitter queries.
//!
//! Parses a source buffer for one [`Language`] and collects every function,
//! method, and constructor node matched by that language's declaration query.
//! Extraction is best effort: a tree with syntax errors is queried as-is.

use std::fmt;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::error::{IndexError, Result};
use crate::lang::Language;

const PYTHON_DECLARATIONS: &str = "(function_definition) @decl";

const JAVA_DECLARATIONS: &str = r#"
(method_declaration) @decl
(constructor_declaration) @decl
"#;

/// Kind of a matched declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Function,
    Method,
    Constructor,
}

impl DeclKind {
    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "function_definition" => Some(DeclKind::Function),
            "method_declaration" => Some(DeclKind::Method),
            "constructor_declaration" => Some(DeclKind::Constructor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeclKind::Function => "function",
            DeclKind::Method => "method",
            DeclKind::Constructor => "constructor",
        }
    }

    /// Inverse of [`DeclKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(DeclKind::Function),
            "method" => Some(DeclKind::Method),
            "constructor" => Some(DeclKind::Constructor),
            _ => None,
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared name of a node, or its absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclName {
    Named(String),
    Anonymous,
}

impl DeclName {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            DeclName::Named(name) => Some(name),
            DeclName::Anonymous => None,
        }
    }
}

impl From<Option<String>> for DeclName {
    fn from(name: Option<String>) -> Self {
        name.map_or(DeclName::Anonymous, DeclName::Named)
    }
}

impl fmt::Display for DeclName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclName::Named(name) => f.write_str(name),
            DeclName::Anonymous => f.write_str("<anonymous>"),
        }
    }
}

/// One matched declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationRecord {
    pub name: DeclName,
    pub kind: DeclKind,
    /// 1-based first line.
    pub start_line: usize,
    /// 1-based last line, `>= start_line`.
    pub end_line: usize,
    /// Verbatim source of the node.
    pub text: String,
}

/// Parse `source` and return every declaration the language's query matches,
/// in match order.
///
/// Zero matches is an empty vector, not an error.
///
/// # Errors
///
/// Returns [`IndexError::Parse`] if the grammar or query cannot be loaded, or
/// the parser produces no tree.
pub fn extract_declarations(source: &[u8], lang: Language) -> Result<Vec<DeclarationRecord>> {
    let grammar = lang.grammar();

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("no syntax tree for {lang} source")))?;

    let query = Query::new(&grammar, declaration_query(lang))
        .map_err(|e| IndexError::Parse(format!("bad {lang} declaration query: {e}")))?;

    let mut records = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);

    while let Some(m) = matches.next() {
        let Some(capture) = m.captures.first() else {
            continue;
        };
        if let Some(record) = to_record(capture.node, source) {
            records.push(record);
        }
    }

    tracing::debug!(lang = lang.id(), count = records.len(), "extracted declarations");
    Ok(records)
}

fn declaration_query(lang: Language) -> &'static str {
    match lang {
        Language::Python => PYTHON_DECLARATIONS,
        Language::Java => JAVA_DECLARATIONS,
    }
}

fn to_record(node: Node<'_>, source: &[u8]) -> Option<DeclarationRecord> {
    let kind = DeclKind::from_node_kind(node.kind())?;
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source))
        .into();

    Some(DeclarationRecord {
        name,
        kind,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        text: node_text(node, source),
    })
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.byte_range()]).into_owned()
}
