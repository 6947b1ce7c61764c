use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ingest::{RagError, Result};

/// Turns text into fixed-length vectors.
///
/// `embed_batch` preserves order: output `i` is the embedding of input `i`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Check a provider response against the expected count and dimension.
pub fn validate_embeddings(
    expected_count: usize,
    dimension: usize,
    embeddings: &[Vec<f32>],
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(RagError::EmbeddingCountMismatch {
            expected: expected_count,
            actual: embeddings.len(),
        });
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    OpenAi,
}

impl EmbeddingBackend {
    fn name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

/// HTTP embedding client for Ollama or any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    client: reqwest::Client,
}

const BATCH_SIZE: usize = 32;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(
        backend: EmbeddingBackend,
        base_url: String,
        model: String,
        dimension: usize,
    ) -> Self {
        Self {
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: None,
            dimension,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Per-request timeout. Timeouts belong to the client, not the pipelines.
    pub fn with_timeout(mut self, timeout: Duration) -> AnyResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(self)
    }

    pub fn default() -> Self {
        Self::new(
            EmbeddingBackend::Ollama,
            "http://localhost:11434".to_string(),
            "all-minilm".to_string(),
            384,
        )
    }

    async fn request_batch(&self, texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
        let url = match self.backend {
            EmbeddingBackend::Ollama => format!("{}/api/embed", self.base_url),
            EmbeddingBackend::OpenAi => format!("{}/embeddings", self.base_url),
        };

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding request failed: {status}: {body}");
        }

        let embeddings = match self.backend {
            EmbeddingBackend::Ollama => {
                let parsed: OllamaEmbeddingResponse = response
                    .json()
                    .await
                    .context("Failed to parse embedding response")?;
                parsed.embeddings
            }
            EmbeddingBackend::OpenAi => {
                let mut parsed: OpenAiEmbeddingResponse = response
                    .json()
                    .await
                    .context("Failed to parse embedding response")?;
                // compatible servers may reorder `data`; `index` restores input order
                parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
                parsed.data.into_iter().map(|d| d.embedding).collect()
            }
        };

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or(RagError::EmbeddingCountMismatch { expected: 1, actual: 0 })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            debug!(batch = i, size = batch.len(), model = %self.model, "requesting embeddings");
            let embeddings = self
                .request_batch(batch)
                .await
                .map_err(|e| RagError::embedding(self.backend.name(), e))?;
            validate_embeddings(batch.len(), self.dimension, &embeddings)?;
            all.extend(embeddings);
        }

        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
