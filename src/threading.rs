//! Thread stage.
//!
//! Loads a channel's message store and relevance results, runs the
//! [`ThreadBuilder`] and hands the threads to the report emitter.

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::Utc;
use threadline_core::relevance::relevant_marks;
use threadline_core::{Thread, ThreadBuilder, ThreadStats, ThreaderConfig};

use crate::config::Config;
use crate::discord::load_messages;
use crate::error::{write_json, write_text};
use crate::filter::load_relevance;
use crate::report::{render_text, ReportMetadata, ThreadedReport};

/// Command-line overrides for the thread stage.
#[derive(Debug, Clone, Default)]
pub struct ThreadOptions {
    pub export: Option<PathBuf>,
    pub filtered: Option<PathBuf>,
    pub window_secs: Option<i64>,
    pub min_size: Option<usize>,
}

/// What the thread stage produced.
#[derive(Debug, Clone)]
pub struct ThreadOutcome {
    pub threads: Vec<Thread>,
    pub statistics: ThreadStats,
    pub substantial_threads: usize,
    pub output: PathBuf,
}

pub fn thread_channel(
    config: &Config,
    channel: &str,
    opts: &ThreadOptions,
) -> Result<ThreadOutcome> {
    let window_secs = opts.window_secs.unwrap_or(config.threading.time_window_secs);
    if window_secs <= 0 {
        bail!("--window-secs must be > 0");
    }
    let min_size = opts.min_size.unwrap_or(config.threading.min_thread_size);
    if min_size == 0 {
        bail!("--min-size must be >= 1");
    }

    let export = opts
        .export
        .clone()
        .unwrap_or_else(|| config.export_path(channel));
    let filtered = opts
        .filtered
        .clone()
        .unwrap_or_else(|| config.filtered_path(channel));

    let store = load_messages(&export)?;
    let results = load_relevance(&filtered)?;
    let marks = relevant_marks(&results, Some(channel));
    tracing::info!(
        channel,
        messages = store.len(),
        relevant = marks.len(),
        window_secs,
        "threading"
    );

    let builder = ThreadBuilder::new(ThreaderConfig::with_window_secs(window_secs));
    let threads = builder.build(&store.messages, &marks);

    let metadata = ReportMetadata {
        created: Utc::now(),
        channel: Some(channel.to_string()),
        source_export: Some(export),
        source_filtered: Some(filtered),
        time_window_secs: window_secs,
        min_thread_size: min_size,
    };
    let report = ThreadedReport::new(metadata, &threads);

    let output = config.threaded_path(channel);
    write_json(&output, &report)?;
    write_text(&config.threaded_text_path(channel), &render_text(&report.threads))?;

    let statistics = report.statistics.clone();
    let substantial_threads = report.substantial_threads;
    Ok(ThreadOutcome {
        threads,
        statistics,
        substantial_threads,
        output,
    })
}

/// `threadline thread <channel>`.
pub fn run_thread(config: &Config, channel: &str, opts: &ThreadOptions) -> Result<()> {
    let outcome = thread_channel(config, channel, opts)?;
    let stats = &outcome.statistics;

    println!("Threaded {}", channel);
    println!("  Threads:             {}", stats.total_threads);
    println!("  Messages:            {}", stats.total_messages);
    println!("  Avg messages/thread: {}", stats.avg_messages_per_thread);
    println!(
        "  Min / max:           {} / {}",
        stats.min_messages, stats.max_messages
    );
    println!("  Substantial threads: {}", outcome.substantial_threads);
    println!("  Output:              {}", outcome.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
        "channel": {"name": "hw"},
        "messages": [
            {"id": "a", "timestamp": "2025-01-01T10:00:00Z", "content": "UART shell",
             "author": {"id": "u1", "name": "alice"}},
            {"id": "b", "timestamp": "2025-01-01T10:01:00Z", "content": "baud?",
             "author": {"id": "u2", "name": "bob"}, "reference": {"messageId": "a"}},
            {"id": "c", "timestamp": "2025-01-01T10:03:00Z", "content": "115200",
             "author": {"id": "u1", "name": "alice"}},
            {"id": "d", "timestamp": "2025-01-01T15:00:00Z", "content": "lunch",
             "author": {"id": "u3", "name": "carol"}}
        ]
    }"#;

    fn workspace(filtered: &str) -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.paths.export_dir = tmp.path().join("exports");
        config.paths.output_dir = tmp.path().join("out");
        std::fs::create_dir_all(&config.paths.export_dir).unwrap();
        std::fs::write(config.export_path("hw"), EXPORT).unwrap();
        crate::error::write_text(&config.filtered_path("hw"), filtered).unwrap();
        (tmp, config)
    }

    #[test]
    fn builds_and_writes_threads() {
        let (_tmp, config) =
            workspace(r#"{"results": [{"metadata": {"id": "a"}, "similarity": 0.8}]}"#);
        let outcome = thread_channel(&config, "hw", &ThreadOptions::default()).unwrap();
        assert_eq!(outcome.threads.len(), 1);
        assert_eq!(outcome.threads[0].len(), 3);
        assert_eq!(outcome.substantial_threads, 1);
        assert!(config.threaded_text_path("hw").exists());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.output).unwrap()).unwrap();
        assert_eq!(written["threads"][0]["channel"], "hw");
        assert_eq!(written["statistics"]["totalMessages"], 3);
    }

    #[test]
    fn narrow_window_drops_unlinked_follow_up() {
        let (_tmp, config) = workspace(r#"[{"metadata": {"id": "a"}}]"#);
        let opts = ThreadOptions {
            window_secs: Some(60),
            min_size: Some(1),
            ..ThreadOptions::default()
        };
        let outcome = thread_channel(&config, "hw", &opts).unwrap();
        let ids: Vec<&str> = outcome.threads[0]
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn zero_min_size_is_rejected() {
        let (_tmp, config) = workspace(r#"[{"metadata": {"id": "a"}}]"#);
        let opts = ThreadOptions {
            min_size: Some(0),
            ..ThreadOptions::default()
        };
        let err = thread_channel(&config, "hw", &opts).unwrap_err();
        assert!(err.to_string().contains("--min-size"));
        assert!(!config.threaded_path("hw").exists());
    }

    #[test]
    fn huge_window_is_accepted() {
        let (_tmp, config) = workspace(r#"[{"metadata": {"id": "a"}}]"#);
        let opts = ThreadOptions {
            window_secs: Some(10_000_000_000_000),
            min_size: Some(1),
            ..ThreadOptions::default()
        };
        let outcome = thread_channel(&config, "hw", &opts).unwrap();
        assert_eq!(outcome.threads.len(), 1);
        assert_eq!(outcome.threads[0].len(), 3);
    }

    #[test]
    fn missing_filtered_file_is_input_not_found() {
        let (_tmp, config) = workspace("[]");
        let opts = ThreadOptions {
            filtered: Some(config.paths.output_dir.join("nope.json")),
            ..ThreadOptions::default()
        };
        let err = thread_channel(&config, "hw", &opts).unwrap_err();
        let kind = err.downcast_ref::<PipelineError>().map(PipelineError::kind);
        assert_eq!(kind, Some("InputNotFound"));
    }

    #[test]
    fn empty_relevance_yields_zero_threads() {
        let (_tmp, config) = workspace(r#"{"results": []}"#);
        let outcome = thread_channel(&config, "hw", &ThreadOptions::default()).unwrap();
        assert!(outcome.threads.is_empty());
        assert_eq!(outcome.statistics.avg_messages_per_thread, 0.0);
    }
}
