//! Chat-completion collaborator.
//!
//! Sends a system + user prompt to OpenAI chat completions or to Ollama's
//! `/api/generate` and returns the reply text with its token usage. Only
//! transport lives here; prompt rendering and reply parsing are in
//! [`threadline_core::analysis`].

use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::config::AnalysisConfig;
use crate::embedding::post_with_retry;
use crate::error::PipelineError;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Transient-failure retries for completion requests.
const COMPLETION_RETRIES: u32 = 1;

/// A model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
}

/// Request a completion from the configured analysis provider.
pub async fn complete(config: &AnalysisConfig, system: &str, prompt: &str) -> Result<Completion> {
    match config.provider.as_str() {
        "openai" => complete_openai(config, system, prompt).await,
        "ollama" => complete_ollama(config, system, prompt).await,
        "disabled" => bail!("Analysis provider is disabled"),
        other => bail!("Unknown analysis provider: {}", other),
    }
}

async fn complete_openai(
    config: &AnalysisConfig,
    system: &str,
    prompt: &str,
) -> Result<Completion> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| PipelineError::upstream("openai", "OPENAI_API_KEY not set"))?;
    let url = match config.url.as_deref() {
        Some(base) => format!("{}/v1/chat/completions", base.trim_end_matches('/')),
        None => OPENAI_CHAT_URL.to_string(),
    };

    let body = json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": prompt }
        ],
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
    });

    let reply = post_with_retry(
        "openai",
        &url,
        Some(&api_key),
        &body,
        config.timeout_secs,
        COMPLETION_RETRIES,
    )
    .await?;
    Ok(parse_openai_completion(&reply)?)
}

async fn complete_ollama(
    config: &AnalysisConfig,
    system: &str,
    prompt: &str,
) -> Result<Completion> {
    let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
    let url = format!("{}/api/generate", base.trim_end_matches('/'));

    let body = json!({
        "model": config.model,
        "system": system,
        "prompt": prompt,
        "stream": false,
        "options": {
            "temperature": config.temperature,
            "num_predict": config.max_tokens,
        },
    });

    let reply = post_with_retry(
        "ollama",
        &url,
        None,
        &body,
        config.timeout_secs,
        COMPLETION_RETRIES,
    )
    .await?;
    Ok(parse_ollama_completion(&reply)?)
}

/// Extract `choices[0].message.content` and `usage.total_tokens`.
fn parse_openai_completion(json: &Value) -> Result<Completion, PipelineError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::upstream("openai", "response missing message content"))?;
    let total_tokens = json
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(Completion {
        text: text.to_string(),
        total_tokens,
    })
}

/// Extract `response`; tokens are `prompt_eval_count + eval_count`.
fn parse_ollama_completion(json: &Value) -> Result<Completion, PipelineError> {
    let text = json
        .get("response")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::upstream("ollama", "response missing text"))?;
    let count = |key: &str| json.get(key).and_then(Value::as_u64).unwrap_or(0);

    Ok(Completion {
        text: text.to_string(),
        total_tokens: count("prompt_eval_count") + count("eval_count"),
    })
}
