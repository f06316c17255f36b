//! Embedding client abstraction and HTTP implementation.
//!
//! Defines the [`Embedder`] trait and [`HttpEmbedder`], which talks to one of
//! three wire formats:
//! - **voyage**: `POST /v1/embeddings` with `input_type` (default provider)
//! - **openai**: `POST /v1/embeddings`
//! - **ollama**: `POST /api/embed`, no credential
//!
//! Also provides the vector utilities the store builds on:
//! - [`cosine_similarity`] / [`cosine_distance`]
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codec
//!
//! # Ordering
//!
//! Vectors are returned in input order. Responses that carry `data[].index`
//! are re-sorted by it; the result length and dimensionality are checked
//! before returning.
//!
//! # Retry Strategy
//!
//! `embedding.max_retries` defaults to 0: the first failure is final.
//! When raised, HTTP 429, 5xx and network errors are retried with
//! exponential backoff (1s, 2s, 4s … capped at 32s); other 4xx fail at once.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{IndexError, Result};

/// Hint sent to providers that embed documents and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Document,
    Query,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Document => "document",
            InputType::Query => "query",
        }
    }
}

/// Anything that turns a batch of texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"voyage-code-2"`).
    fn model_name(&self) -> &str;

    /// Embed `texts`, returning exactly one vector per text in input order.
    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder
        .embed(&[text.to_string()], InputType::Query)
        .await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| IndexError::EmbeddingMismatch("empty embedding response".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Voyage,
    OpenAI,
    Ollama,
}

impl Flavor {
    fn label(self) -> &'static str {
        match self {
            Flavor::Voyage => "Voyage",
            Flavor::OpenAI => "OpenAI",
            Flavor::Ollama => "Ollama",
        }
    }
}

/// Embedding client for the hosted (or local Ollama) HTTP APIs.
pub struct HttpEmbedder {
    flavor: Flavor,
    model: String,
    url: String,
    api_key: Option<String>,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Build a client from configuration, reading the API key from the
    /// environment.
    ///
    /// # Errors
    ///
    /// [`IndexError::MissingCredential`] if the provider needs a key and the
    /// variable is unset or empty; [`IndexError::Client`] for an unknown
    /// provider or an HTTP client build failure.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.api_key_env_or_default() {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => return Err(IndexError::MissingCredential(var.to_string())),
            },
            None => None,
        };
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit key instead of the environment.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let flavor = match config.provider.as_str() {
            "voyage" => Flavor::Voyage,
            "openai" => Flavor::OpenAI,
            "ollama" => Flavor::Ollama,
            other => {
                return Err(IndexError::Client(format!(
                    "unknown embedding provider: {other}"
                )))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Client(e.to_string()))?;

        Ok(Self {
            flavor,
            model: config.model_or_default().to_string(),
            url: config.url_or_default().to_string(),
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match self.flavor {
            Flavor::Voyage | Flavor::OpenAI => format!("{}/v1/embeddings", self.url),
            Flavor::Ollama => format!("{}/api/embed", self.url),
        }
    }

    fn request_body(&self, texts: &[String], input_type: InputType) -> serde_json::Value {
        match self.flavor {
            Flavor::Voyage => serde_json::json!({
                "model": self.model,
                "input": texts,
                "input_type": input_type.as_str(),
            }),
            Flavor::OpenAI | Flavor::Ollama => serde_json::json!({
                "model": self.model,
                "input": texts,
            }),
        }
    }

    /// One request with retry/backoff.
    async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let body = self.request_body(texts, input_type);
        let endpoint = self.endpoint();
        let label = self.flavor.label();

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| IndexError::Embedding(e.to_string()))?;
                        return match self.flavor {
                            Flavor::Ollama => parse_ollama_response(&json),
                            Flavor::Voyage | Flavor::OpenAI => parse_data_response(&json),
                        };
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = IndexError::Embedding(format!(
                        "{} API error {}: {}",
                        label, status, body_text
                    ));

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(IndexError::Embedding(format!(
                        "{} connection error ({}): {}",
                        label, endpoint, e
                    )));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IndexError::Embedding("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(
                model = %self.model,
                batch = batch.len(),
                input_type = input_type.as_str(),
                "sending embedding request"
            );
            let batch_vectors = self.embed_batch(batch, input_type).await?;
            // a short batch followed by a long one must not shift vectors
            check_batch(batch.len(), &batch_vectors)?;
            vectors.extend(batch_vectors);
        }

        check_batch(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

/// Verify one vector per input and a single shared dimensionality.
pub fn check_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(IndexError::EmbeddingMismatch(format!(
            "sent {} texts, got {} vectors",
            expected,
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(IndexError::EmbeddingMismatch("empty vector".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(IndexError::EmbeddingMismatch(format!(
                "mixed dimensionality: {} vs {}",
                first.len(),
                bad.len()
            )));
        }
    }
    Ok(())
}

/// Parse a Voyage/OpenAI style `{"data": [{"embedding": [...], "index": n}]}`
/// response, ordering by `index` when present.
///
/// The indices must be exactly `0..data.len()`; duplicates or gaps are an
/// [`IndexError::EmbeddingMismatch`].
fn parse_data_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| IndexError::Embedding("invalid response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| IndexError::Embedding("invalid response: missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(serde_json::Value::as_u64)
            .map_or(position, |i| i as usize);

        indexed.push((index, to_f32_vec(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    if let Some((position, (index, _))) = indexed
        .iter()
        .enumerate()
        .find(|(position, (index, _))| position != index)
    {
        return Err(IndexError::EmbeddingMismatch(format!(
            "response index {} at position {}, expected indices 0..{}",
            index,
            position,
            indexed.len()
        )));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            IndexError::Embedding("invalid Ollama response: missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|embedding| -> Result<Vec<f32>> {
            let values = embedding.as_array().ok_or_else(|| {
                IndexError::Embedding("invalid Ollama response: embedding is not an array".into())
            })?;
            to_f32_vec(values)
        })
        .collect()
}

/// Every element must be a number that is finite as `f32`.
fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .map(|x| x as f32)
                .filter(|x| x.is_finite())
                .ok_or_else(|| {
                    IndexError::Embedding(format!(
                        "invalid response: embedding element {i} is not a finite number: {v}"
                    ))
                })
        })
        .collect()
}

/// Create the embedder described by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(HttpEmbedder::new(config)?))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero-norm, or
/// mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// `1 - cosine_similarity`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let similarity = cosine_similarity(a, b);
    if similarity.is_nan() {
        return f32::NAN;
    }
    (1.0 - similarity).max(0.0)
}
