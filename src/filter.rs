//! Relevance Filter stage.
//!
//! Chunks a channel's messages, embeds every chunk and the relevance
//! query, and keeps the chunks whose cosine similarity reaches the
//! threshold. Results are written to `{channel}_filtered_messages.json`
//! (read back by the thread stage) and a readable `.txt` companion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use threadline_core::relevance::{chunk_messages, score_chunks, RelevanceResult};

use crate::config::Config;
use crate::discord::load_messages;
use crate::embedding::{create_provider, embed_query, embed_texts};
use crate::error::{read_json, write_json, write_text, PipelineError};
use crate::progress::{ProgressEvent, ProgressReporter};

/// The filtered-messages document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredReport {
    pub query: String,
    pub threshold: f32,
    pub source: PathBuf,
    pub total_messages: usize,
    pub total_chunks: usize,
    /// Chunks that received an embedding.
    pub scored_chunks: usize,
    /// Distinct messages with at least one relevant chunk.
    pub relevant_messages: usize,
    pub results: Vec<RelevanceResult>,
}

/// Run the filter stage for one channel and return the written report.
pub async fn filter_channel(
    config: &Config,
    channel: &str,
    reporter: &dyn ProgressReporter,
) -> Result<FilteredReport> {
    let query = config.relevance.query.trim();
    if query.is_empty() {
        bail!("relevance.query must be set to run the filter stage");
    }
    if !config.embedding.is_enabled() {
        bail!("embedding.provider is disabled; the filter stage needs embeddings");
    }

    let source = config.export_path(channel);
    let store = load_messages(&source)?;
    let chunks = chunk_messages(&store.messages, Some(channel), config.relevance.chunk_chars);
    tracing::info!(channel, messages = store.len(), chunks = chunks.len(), "chunked messages");

    let provider = create_provider(&config.embedding)?;
    let query_vec = embed_query(provider.as_ref(), &config.embedding, query)
        .await
        .with_context(|| format!("Failed to embed the relevance query for {}", channel))?;

    reporter.report(ProgressEvent::Started {
        channel: channel.to_string(),
        stage: "embed",
    });

    let total = chunks.len() as u64;
    let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        match embed_texts(provider.as_ref(), &config.embedding, &texts).await {
            Ok(vectors) => embeddings.extend(vectors.into_iter().map(Some)),
            Err(e) => {
                tracing::warn!(
                    channel,
                    first_id = %batch[0].metadata.id,
                    chunks = batch.len(),
                    error = %e,
                    "embedding batch failed; chunks left unscored"
                );
                embeddings.extend(std::iter::repeat(None).take(batch.len()));
            }
        }
        reporter.report(ProgressEvent::Advanced {
            channel: channel.to_string(),
            stage: "embed",
            n: embeddings.len() as u64,
            total,
        });
    }

    let results = score_chunks(&query_vec, &chunks, &embeddings, config.relevance.threshold);
    let relevant_messages = results
        .iter()
        .map(|r| r.metadata.id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let report = FilteredReport {
        query: query.to_string(),
        threshold: config.relevance.threshold,
        source,
        total_messages: store.len(),
        total_chunks: chunks.len(),
        scored_chunks: embeddings.iter().filter(|e| e.is_some()).count(),
        relevant_messages,
        results,
    };

    write_json(&config.filtered_path(channel), &report)?;
    write_text(&config.filtered_text_path(channel), &render_text(&report.results))?;

    tracing::info!(
        channel,
        relevant_messages = report.relevant_messages,
        results = report.results.len(),
        "filter stage complete"
    );
    Ok(report)
}

/// `threadline filter <channel>`.
pub async fn run_filter(
    config: &Config,
    channel: &str,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let report = filter_channel(config, channel, reporter).await?;

    println!("Filtered {}", channel);
    println!("  Messages:          {}", report.total_messages);
    println!(
        "  Chunks scored:     {} / {}",
        report.scored_chunks, report.total_chunks
    );
    println!("  Relevant messages: {}", report.relevant_messages);
    println!("  Threshold:         {}", report.threshold);
    println!("  Output:            {}", config.filtered_path(channel).display());
    Ok(())
}

/// Read relevance results from a filtered document.
///
/// Accepts `{ "results": [...] }` or a bare array of results.
pub fn load_relevance(path: &Path) -> Result<Vec<RelevanceResult>, PipelineError> {
    let doc: Value = read_json(path)?;
    let results = match doc {
        array @ Value::Array(_) => array,
        Value::Object(mut map) => map
            .remove("results")
            .ok_or_else(|| PipelineError::malformed(path, "missing `results` array"))?,
        _ => return Err(PipelineError::malformed(path, "expected an object or array")),
    };
    serde_json::from_value(results).map_err(|e| PipelineError::malformed(path, e.to_string()))
}

fn render_text(results: &[RelevanceResult]) -> String {
    let rule = "=".repeat(70);
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let date = r
                .metadata
                .timestamp
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            format!(
                "[{}] Similarity: {:.3} | {} | {}\n{}\n{}",
                i + 1,
                r.similarity,
                r.metadata.author,
                date,
                r.text,
                rule
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
