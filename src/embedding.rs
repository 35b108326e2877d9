//! Embedding providers over HTTP.
//!
//! Implementations of [`EmbeddingProvider`]:
//! - **[`DisabledProvider`]**: every embed call fails; used when
//!   `embedding.provider = "disabled"`.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings`, reads `OPENAI_API_KEY`.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama.
//!
//! # Retry Strategy
//!
//! Both HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, ... capped at 32s
//!
//! Failures surface as [`PipelineError::UpstreamServiceError`].

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;
use threadline_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Instantiate the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a batch of texts, one vector per input in input order.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let vectors = match provider.provider_name() {
        "openai" => embed_openai(provider.model_name(), config, texts).await?,
        "ollama" => embed_ollama(provider.model_name(), config, texts).await?,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    };

    if vectors.len() != texts.len() {
        return Err(PipelineError::upstream(
            provider.provider_name(),
            format!(
                "expected {} embeddings, received {}",
                texts.len(),
                vectors.len()
            ),
        )
        .into());
    }
    Ok(vectors)
}

/// Embed a single text (the relevance query).
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::upstream(provider.provider_name(), "empty response").into())
}

pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn provider_name(&self) -> &str {
        "disabled"
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Embedding provider for the OpenAI API.
pub struct OpenAIProvider {
    model: String,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Fails when `embedding.model` is unset or `OPENAI_API_KEY` is not in
    /// the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self { model })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Embedding provider for a local Ollama instance.
///
/// Requires an embedding model to be pulled, e.g.
/// `ollama pull nomic-embed-text`.
pub struct OllamaProvider {
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self { model })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

async fn embed_openai(
    model: &str,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| PipelineError::upstream("openai", "OPENAI_API_KEY not set"))?;
    let body = serde_json::json!({ "model": model, "input": texts });
    let json = post_with_retry(
        "openai",
        OPENAI_EMBEDDINGS_URL,
        Some(&api_key),
        &body,
        config.timeout_secs,
        config.max_retries,
    )
    .await?;
    Ok(parse_openai_response(&json)?)
}

async fn embed_ollama(
    model: &str,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
    let url = format!("{}/api/embed", base.trim_end_matches('/'));
    let body = serde_json::json!({ "model": model, "input": texts });
    let json = post_with_retry(
        "ollama",
        &url,
        None,
        &body,
        config.timeout_secs,
        config.max_retries,
    )
    .await?;
    Ok(parse_ollama_response(&json)?)
}

/// Text of a non-success response body. A body that cannot be read is
/// logged and replaced by a marker carrying the read error.
fn error_body<E: std::fmt::Display>(service: &str, body: Result<String, E>) -> String {
    match body {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(service, error = %e, "failed to read error response body");
            format!("<unreadable body: {}>", e)
        }
    }
}

/// POST a JSON body and return the decoded JSON reply, retrying 429, 5xx
/// and network errors up to `max_retries` times.
pub(crate) async fn post_with_retry(
    service: &str,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    timeout_secs: u64,
    max_retries: u32,
) -> Result<Value, PipelineError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::upstream(service, e.to_string()))?;

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| PipelineError::upstream(service, e.to_string()));
                }

                let body_text = error_body(service, response.text().await);
                let err = PipelineError::upstream(service, format!("{}: {}", status, body_text));

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(PipelineError::upstream(
                    service,
                    format!("connection error ({}): {}", url, e),
                ));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| PipelineError::upstream(service, "failed after retries")))
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::upstream("openai", "response missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::upstream("openai", "response item missing embedding"))?;
        indexed.push((index, to_vector(embedding)));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let embeddings = json
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::upstream("ollama", "response missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_vector(values))
                .ok_or_else(|| PipelineError::upstream("ollama", "embedding is not an array"))
        })
        .collect()
}

fn to_vector(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}
