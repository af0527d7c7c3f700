use crate::config::EmbeddingConfig;
use crate::services::conversation::providers::EmbeddingProvider;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// HTTP client for an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Any transport error, non-2xx status, malformed body or wrong-sized
/// vector is a hard error. There is no fallback vector.
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Refusing to embed empty text");
        }

        debug!("Generating embedding for {} chars", text.chars().count());

        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

/// Accepts the OpenAI `{"data":[{"embedding":[...]}]}` shape, llama.cpp's
/// `{"embedding":[...]}`, and a bare or wrapped top-level array.
fn parse_embedding(json_value: &Value) -> Result<Vec<f32>> {
    let floats = |v: &Value| -> Option<Vec<f32>> {
        v.as_array()
            .map(|arr| arr.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect())
    };

    let embedding = match json_value {
        Value::Object(obj) if obj.get("data").map_or(false, Value::is_array) => obj["data"]
            .get(0)
            .and_then(|first| first.get("embedding"))
            .and_then(floats),
        Value::Object(obj) => obj.get("embedding").and_then(floats),
        Value::Array(arr) => match arr.first() {
            Some(first) if first.is_object() => first.get("embedding").and_then(floats),
            Some(_) => floats(json_value),
            None => None,
        },
        _ => None,
    };

    match embedding {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => anyhow::bail!("Generated embedding is empty"),
        None => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}
