//! Embedding service providers
//!
//! The [`EmbeddingProvider`] trait is the seam between the generator and
//! whatever produces the vectors. Production uses [`OpenAiProvider`], a thin
//! reqwest client for any OpenAI-compatible `/embeddings` endpoint; tests
//! substitute stub implementations.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Something that can turn text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in one service call. The
    /// returned vectors are in request order, one per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The vector length this provider produces.
    fn dimension(&self) -> usize;

    /// Name/identifier of this provider, for logging and model tagging.
    fn provider_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingObject {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embedding service.
///
/// Sends `POST {api_base}/embeddings` with `{model, input, dimensions}` and
/// expects `{data: [{embedding: [...]}, ...]}` in request order. Any non-2xx
/// response or malformed body fails the whole call; per-item recovery is the
/// generator's job.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: EmbedConfig,
}

impl OpenAiProvider {
    /// Create a provider from a validated configuration.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbedError::service(format!(
                "embedding request returned {status}: {detail}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::service(format!("malformed embedding response: {e}")))?;

        // The zip between inputs and outputs is positional; a count mismatch
        // would silently misassign vectors, so reject it outright.
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::service(format!(
                "embedding response count mismatch: sent {} inputs, got {} embeddings",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.request(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::service("no embedding returned for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.config.dimensions
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
