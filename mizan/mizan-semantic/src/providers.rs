//! Embedding providers: Ollama, OpenAI and an offline hashing embedder.

use async_trait::async_trait;
use mizan_core::config::ProvidersConfig;
use mizan_core::error::{MizanError, Result};
use mizan_core::traits::Embedder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MizanError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Embeddings from a local Ollama server.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        info!("Initialized Ollama embedder with model: {}", model);
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding with Ollama");

        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let url = format!("{}/api/embeddings", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::embedding(format!("Ollama API error: {}", error_text)));
        }

        let response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| MizanError::embedding(format!("Invalid Ollama response: {}", e)))?;
        Ok(response.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embeddings from the OpenAI API.
pub struct OpenAIEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(
        api_key: Option<String>,
        endpoint: Option<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.ok_or_else(|| MizanError::config("OpenAI API key not configured"))?;
        let model = model.into();
        info!("Initialized OpenAI embedder with model: {}", model);
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            api_key,
            model,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MizanError::embedding("OpenAI returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Generating {} embeddings with OpenAI", texts.len());

        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::embedding(format!("OpenAI API error: {}", error_text)));
        }

        let response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| MizanError::embedding(format!("Invalid OpenAI response: {}", e)))?;
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic feature-hashing embedder that needs no external service.
///
/// Lowercased words are hashed (FNV-1a) into signed buckets and the result is
/// L2-normalised, so texts sharing vocabulary have high cosine similarity.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0xcbf29ce484222325u64, |hash, b| {
            (hash ^ *b as u64).wrapping_mul(0x100000001b3)
        })
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.unicode_words() {
            let hash = Self::fnv1a(word.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedder selected in configuration.
pub fn create_embedder(config: &ProvidersConfig) -> Result<Arc<dyn Embedder>> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let embedder: Arc<dyn Embedder> = match config.embedding_provider.as_str() {
        "ollama" => Arc::new(OllamaEmbedder::new(
            config
                .embedding_endpoint
                .clone()
                .unwrap_or_else(|| config.ollama_url.clone()),
            config.embedding_model.clone(),
            config.embedding_dimension,
            timeout,
        )?),
        "openai" => Arc::new(OpenAIEmbedder::new(
            config.openai_api_key.clone(),
            config.embedding_endpoint.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            timeout,
        )?),
        "hashing" => Arc::new(HashingEmbedder::new(config.embedding_dimension)),
        other => {
            return Err(MizanError::config(format!(
                "Unknown embedding provider: {}",
                other
            )));
        }
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Murabaha cost-plus sale").await.unwrap();
        let b = embedder.embed("Murabaha cost-plus sale").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_similarity() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed("what is murabaha").await.unwrap();
        let related = embedder
            .embed("murabaha is a sale where the cost is disclosed")
            .await
            .unwrap();
        let unrelated = embedder.embed("zakat on gold jewellery").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed("").await.unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn test_create_embedder() {
        let mut config = ProvidersConfig::default();
        config.embedding_provider = "hashing".to_string();
        config.embedding_dimension = 32;
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.model_name(), "hashing");

        config.embedding_provider = "openai".to_string();
        config.openai_api_key = None;
        assert!(create_embedder(&config).is_err());

        config.embedding_provider = "onnx".to_string();
        assert!(create_embedder(&config).is_err());
    }
}
