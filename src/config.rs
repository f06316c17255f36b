//! TOML configuration.
//!
//! Every section is optional; a missing config file yields
//! [`Config::default`]. CLI flags are applied on top by the binary.
//!
//! ```toml
//! [db]
//! path = "vector_db"
//! collection = "project_code"
//!
//! [embedding]
//! provider = "voyage"
//! model = "voyage-code-2"
//!
//! [query]
//! neighbors = 3
//! write_mode = "upsert"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::WriteMode;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Data directory holding the collection database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            collection: default_collection(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vector_db")
}
fn default_collection() -> String {
    "project_code".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `voyage`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (mock servers, proxies, non-default Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "voyage".to_string()
}
fn default_batch_size() -> usize {
    128
}
fn default_max_retries() -> u32 {
    0
}
fn default_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn model_or_default(&self) -> &str {
        if let Some(model) = self.model.as_deref() {
            return model;
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small",
            "ollama" => "nomic-embed-text",
            _ => "voyage-code-2",
        }
    }

    pub fn url_or_default(&self) -> &str {
        if let Some(url) = self.url.as_deref() {
            return url.trim_end_matches('/');
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com",
            "ollama" => "http://localhost:11434",
            _ => "https://api.voyageai.com",
        }
    }

    /// Environment variable carrying the credential, `None` when the
    /// provider needs none.
    pub fn api_key_env_or_default(&self) -> Option<&str> {
        if let Some(var) = self.api_key_env.as_deref() {
            return Some(var);
        }
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "ollama" => None,
            _ => Some("VOYAGE_API_KEY"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Neighbors requested per declaration (including the self-match).
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            neighbors: default_neighbors(),
            write_mode: WriteMode::default(),
        }
    }
}

fn default_neighbors() -> usize {
    3
}

/// Load and validate the config file, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file absent, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.db.collection.trim().is_empty() {
        anyhow::bail!("db.collection must not be empty");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "voyage" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be voyage, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("codesim.toml")).unwrap();
        assert_eq!(cfg.db.collection, "project_code");
        assert_eq!(cfg.db.path, PathBuf::from("vector_db"));
        assert_eq!(cfg.query.neighbors, 3);
        assert_eq!(cfg.query.write_mode, WriteMode::Upsert);
        assert_eq!(cfg.embedding.model_or_default(), "voyage-code-2");
        assert_eq!(cfg.embedding.api_key_env_or_default(), Some("VOYAGE_API_KEY"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("codesim.toml");
        std::fs::write(
            &path,
            "[embedding]\nprovider = \"ollama\"\nurl = \"http://gpu-box:11434/\"\n\n[query]\nwrite_mode = \"insert\"\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.embedding.url_or_default(), "http://gpu-box:11434");
        assert_eq!(cfg.embedding.api_key_env_or_default(), None);
        assert_eq!(cfg.embedding.model_or_default(), "nomic-embed-text");
        assert_eq!(cfg.query.write_mode, WriteMode::Insert);
        assert_eq!(cfg.db.collection, "project_code");
    }

    #[test]
    fn rejects_unknown_provider() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("codesim.toml");
        std::fs::write(&path, "[embedding]\nprovider = \"magic\"\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn rejects_unknown_write_mode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("codesim.toml");
        std::fs::write(&path, "[query]\nwrite_mode = \"append\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
