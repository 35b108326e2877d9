//! LLM analysis stage.
//!
//! Sends each substantial thread of a channel to the configured model and
//! collects the extracted findings into `{channel}_analysis.json`.
//! Threads are analyzed in fixed-size batches: the requests of one batch
//! run concurrently and batches are separated by `batch_delay_ms`. A
//! failed thread is logged and counted, never fatal to the channel.

use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use threadline_core::analysis::{
    analysis_prompt, parse_analysis, AggregatedFindings, ThreadAnalysis, SYSTEM_PROMPT,
};
use threadline_core::ThreadMessage;

use crate::config::{AnalysisConfig, Config};
use crate::llm::complete;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::report::read_threads;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedAnalysis {
    pub thread_id: usize,
    pub message_count: usize,
    pub analysis: ThreadAnalysis,
}

/// The per-channel analysis document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAnalysis {
    pub channel: String,
    #[serde(default)]
    pub threads_analyzed: usize,
    #[serde(default)]
    pub threads_failed: usize,
    /// Threads below the minimum size, not sent to the model.
    #[serde(default)]
    pub threads_skipped: usize,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub aggregated_findings: AggregatedFindings,
    #[serde(default)]
    pub detailed_analyses: Vec<DetailedAnalysis>,
}

/// Result of analyzing one thread.
type ThreadOutcome = (usize, usize, Result<(ThreadAnalysis, u64)>);

impl ChannelAnalysis {
    /// Fold per-thread outcomes, in thread order, into the channel document.
    fn from_outcomes(channel: &str, skipped: usize, outcomes: Vec<ThreadOutcome>) -> Self {
        let mut doc = ChannelAnalysis {
            channel: channel.to_string(),
            threads_skipped: skipped,
            ..Default::default()
        };

        for (thread_id, message_count, outcome) in outcomes {
            match outcome {
                Ok((analysis, tokens)) => {
                    doc.threads_analyzed += 1;
                    doc.total_tokens += tokens;
                    doc.aggregated_findings.absorb(&analysis);
                    doc.detailed_analyses.push(DetailedAnalysis {
                        thread_id,
                        message_count,
                        analysis,
                    });
                }
                Err(e) => {
                    doc.threads_failed += 1;
                    tracing::warn!(channel, thread_id, error = %e, "thread analysis failed");
                }
            }
        }

        doc
    }
}

async fn analyze_thread(
    config: &AnalysisConfig,
    messages: &[ThreadMessage],
) -> Result<(ThreadAnalysis, u64)> {
    let completion = complete(config, SYSTEM_PROMPT, &analysis_prompt(messages)).await?;
    let analysis = parse_analysis(&completion.text)?;
    Ok((analysis, completion.total_tokens))
}

/// Analyze the substantial threads of one channel and write the result.
///
/// `limit` caps how many threads are sent to the model.
pub async fn analyze_channel(
    config: &Config,
    channel: &str,
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<ChannelAnalysis> {
    if !config.analysis.is_enabled() {
        bail!("analysis.provider is disabled; nothing to analyze with");
    }

    let inputs = read_threads(&config.threaded_path(channel))?;
    let min_size = config.threading.min_thread_size;

    let mut selected = Vec::new();
    let mut skipped = 0;
    for (idx, input) in inputs.into_iter().enumerate() {
        if input.len() < min_size {
            skipped += 1;
            continue;
        }
        let thread_id = input.id().unwrap_or(idx + 1);
        selected.push((thread_id, input.into_messages()));
    }
    if let Some(limit) = limit {
        selected.truncate(limit);
    }

    tracing::info!(channel, threads = selected.len(), skipped, "analyzing threads");
    reporter.report(ProgressEvent::Started {
        channel: channel.to_string(),
        stage: "analyze",
    });

    let total = selected.len();
    let batch_size = config.analysis.batch_size.max(1);
    let mut outcomes: Vec<ThreadOutcome> = Vec::with_capacity(total);

    for (batch_idx, batch) in selected.chunks(batch_size).enumerate() {
        if batch_idx > 0 && config.analysis.batch_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.analysis.batch_delay_ms)).await;
        }

        let results = join_all(
            batch
                .iter()
                .map(|(_, messages)| analyze_thread(&config.analysis, messages)),
        )
        .await;

        for ((thread_id, messages), result) in batch.iter().zip(results) {
            outcomes.push((*thread_id, messages.len(), result));
        }

        reporter.report(ProgressEvent::Advanced {
            channel: channel.to_string(),
            stage: "analyze",
            n: outcomes.len() as u64,
            total: total as u64,
        });
    }

    let doc = ChannelAnalysis::from_outcomes(channel, skipped, outcomes);
    crate::error::write_json(&config.analysis_path(channel), &doc)?;
    Ok(doc)
}

/// `threadline analyze <channel>`.
pub async fn run_analyze(
    config: &Config,
    channel: &str,
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let doc = analyze_channel(config, channel, limit, reporter).await?;
    let findings = &doc.aggregated_findings;

    println!("Analyzed {}", channel);
    println!("  Threads analyzed: {}", doc.threads_analyzed);
    println!("  Threads failed:   {}", doc.threads_failed);
    println!("  Threads skipped:  {}", doc.threads_skipped);
    println!("  Tokens used:      {}", doc.total_tokens);
    println!("  Vulnerabilities:  {}", findings.vulnerabilities.len());
    println!("  Techniques:       {}", findings.techniques.len());
    println!("  Hardware:         {}", findings.hardware.len());
    println!("  Protocols:        {}", findings.protocols.len());
    println!("  Output:           {}", config.analysis_path(channel).display());
    Ok(())
}
