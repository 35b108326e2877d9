//! Multi-channel batch runner.
//!
//! Runs filter → thread → analyze for each channel in turn. A failing
//! channel is recorded with its reason and the run moves on; the command
//! fails at the end if any channel did.

use std::time::Instant;

use anyhow::{bail, Result};

use crate::analyze::analyze_channel;
use crate::config::Config;
use crate::error::PipelineError;
use crate::filter::filter_channel;
use crate::progress::ProgressReporter;
use crate::threading::{thread_channel, ThreadOptions};

/// Options for `threadline run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Channels to process; empty means `config.channels.names`.
    pub channels: Vec<String>,
    /// Reuse existing filtered files instead of re-embedding.
    pub skip_filter: bool,
}

/// Outcome of one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Done {
        threads: usize,
        substantial: usize,
        analyzed: Option<usize>,
    },
    Failed {
        stage: &'static str,
        reason: String,
    },
}

impl ChannelOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ChannelOutcome::Failed { .. })
    }
}

fn failure(stage: &'static str, err: anyhow::Error) -> ChannelOutcome {
    let reason = match err.downcast_ref::<PipelineError>() {
        Some(kind) => format!("{}: {}", kind.kind(), kind),
        None => format!("{:#}", err),
    };
    ChannelOutcome::Failed { stage, reason }
}

async fn run_channel(
    config: &Config,
    channel: &str,
    opts: &RunOptions,
    reporter: &dyn ProgressReporter,
) -> ChannelOutcome {
    if !opts.skip_filter {
        if let Err(e) = filter_channel(config, channel, reporter).await {
            return failure("filter", e);
        }
    }

    let threaded = match thread_channel(config, channel, &ThreadOptions::default()) {
        Ok(outcome) => outcome,
        Err(e) => return failure("thread", e),
    };

    let analyzed = if config.analysis.is_enabled() && threaded.substantial_threads > 0 {
        match analyze_channel(config, channel, None, reporter).await {
            Ok(doc) => Some(doc.threads_analyzed),
            Err(e) => return failure("analyze", e),
        }
    } else {
        None
    };

    ChannelOutcome::Done {
        threads: threaded.statistics.total_threads,
        substantial: threaded.substantial_threads,
        analyzed,
    }
}

/// Process every selected channel, returning outcomes in channel order.
pub async fn run_pipeline(
    config: &Config,
    opts: &RunOptions,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<(String, ChannelOutcome)>> {
    let channels = if opts.channels.is_empty() {
        config.channels.names.clone()
    } else {
        opts.channels.clone()
    };
    if channels.is_empty() {
        bail!("No channels to process. Pass --channel or set [channels] names in the config.");
    }

    let mut outcomes = Vec::with_capacity(channels.len());
    for (i, channel) in channels.iter().enumerate() {
        tracing::info!(
            channel = %channel,
            n = i + 1,
            total = channels.len(),
            "processing channel"
        );
        let outcome = run_channel(config, channel, opts, reporter).await;
        if let ChannelOutcome::Failed { stage, reason } = &outcome {
            tracing::warn!(channel = %channel, stage, reason = %reason, "channel failed");
        }
        outcomes.push((channel.clone(), outcome));
    }
    Ok(outcomes)
}

/// `threadline run`.
pub async fn run_batch(
    config: &Config,
    opts: &RunOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let started = Instant::now();
    let outcomes = run_pipeline(config, opts, reporter).await?;
    let elapsed = started.elapsed().as_secs();

    let failed = outcomes.iter().filter(|(_, o)| o.is_failed()).count();
    let succeeded = outcomes.len() - failed;

    println!("Batch summary");
    println!("=============");
    for (channel, outcome) in &outcomes {
        match outcome {
            ChannelOutcome::Done {
                threads,
                substantial,
                analyzed,
            } => {
                let analysis = analyzed
                    .map(|n| format!(", {} analyzed", n))
                    .unwrap_or_default();
                println!(
                    "  ok    {:<32} {} threads ({} substantial{})",
                    channel, threads, substantial, analysis
                );
            }
            ChannelOutcome::Failed { stage, reason } => {
                println!("  FAIL  {:<32} [{}] {}", channel, stage, reason);
            }
        }
    }
    println!();
    println!("  Succeeded: {}/{}", succeeded, outcomes.len());
    println!("  Failed:    {}/{}", failed, outcomes.len());
    println!("  Time:      {}m {}s", elapsed / 60, elapsed % 60);

    if failed > 0 {
        bail!("{} of {} channels failed", failed, outcomes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{"messages": [
        {"id": "1", "timestamp": "2025-01-01T10:00:00Z", "content": "JTAG",
         "author": {"id": "u1", "name": "alice"}}
    ]}"#;

    #[tokio::test]
    async fn one_failed_channel_does_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.paths.export_dir = tmp.path().join("exports");
        config.paths.output_dir = tmp.path().join("out");
        crate::error::write_text(&config.export_path("good"), EXPORT).unwrap();
        crate::error::write_text(
            &config.filtered_path("good"),
            r#"{"results": [{"metadata": {"id": "1"}, "similarity": 0.9}]}"#,
        )
        .unwrap();

        let opts = RunOptions {
            channels: vec!["missing".into(), "good".into()],
            skip_filter: true,
        };
        let outcomes = run_pipeline(&config, &opts, &NoProgress).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        match &outcomes[0].1 {
            ChannelOutcome::Failed { stage, reason } => {
                assert_eq!(*stage, "thread");
                assert!(reason.starts_with("InputNotFound"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(
            outcomes[1].1,
            ChannelOutcome::Done {
                threads: 1,
                substantial: 0,
                analyzed: None
            }
        );
    }

    #[tokio::test]
    async fn batch_reports_failure() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.paths.export_dir = tmp.path().to_path_buf();
        config.paths.output_dir = tmp.path().to_path_buf();
        let opts = RunOptions {
            channels: vec!["missing".into()],
            skip_filter: true,
        };
        assert!(run_batch(&config, &opts, &NoProgress).await.is_err());
    }

    #[tokio::test]
    async fn no_channels_is_an_error() {
        let config = Config::minimal();
        let result = run_pipeline(&config, &RunOptions::default(), &NoProgress).await;
        assert!(result.is_err());
    }
}
