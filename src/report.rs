//! Report Emitter.
//!
//! Serializes built threads to the threaded JSON document and a readable
//! text transcript, and reads threaded documents back for the analysis
//! and statistics commands.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use threadline_core::stats::filter_substantial;
use threadline_core::{Thread, ThreadInput, ThreadStats};

use crate::error::{read_json, PipelineError};

/// Provenance of a threaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub source_export: Option<PathBuf>,
    #[serde(default)]
    pub source_filtered: Option<PathBuf>,
    pub time_window_secs: i64,
    pub min_thread_size: usize,
}

/// The threaded JSON document.
///
/// `statistics` covers every built thread; `threads` keeps only those
/// with at least `min_thread_size` messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadedReport<'a> {
    pub metadata: ReportMetadata,
    pub statistics: ThreadStats,
    pub substantial_threads: usize,
    pub threads: Vec<&'a Thread>,
}

impl<'a> ThreadedReport<'a> {
    pub fn new(metadata: ReportMetadata, threads: &'a [Thread]) -> Self {
        let statistics = ThreadStats::from_threads(threads);
        let kept = filter_substantial(threads, metadata.min_thread_size);
        Self {
            metadata,
            statistics,
            substantial_threads: kept.len(),
            threads: kept,
        }
    }
}

/// Render threads as a readable transcript.
///
/// Seeds are marked `*`, context messages `-`.
pub fn render_text(threads: &[&Thread]) -> String {
    let rule = "=".repeat(70);
    let mut out = String::new();

    for thread in threads {
        out.push_str(&format!("\n{}\n", rule));
        out.push_str(&format!("THREAD #{}\n", thread.id));
        out.push_str(&format!(
            "Channel: {}\n",
            thread.channel.as_deref().unwrap_or("unknown")
        ));
        out.push_str(&format!("Participants: {}\n", thread.participants.join(", ")));
        out.push_str(&format!(
            "Messages: {} | Duration: {} minutes\n",
            thread.len(),
            thread.duration_minutes()
        ));
        out.push_str(&format!(
            "Time: {}\n",
            thread.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("{}\n\n", rule));

        for (idx, msg) in thread.messages.iter().enumerate() {
            let marker = if msg.is_seed { '*' } else { '-' };
            out.push_str(&format!(
                "{} [{}] {} ({}){}\n{}\n\n",
                marker,
                idx + 1,
                msg.author,
                msg.timestamp.format("%H:%M:%S"),
                if msg.is_reply { " [REPLY]" } else { "" },
                msg.content
            ));
        }
    }

    out
}

/// Read threads from a threaded document.
///
/// Accepts `{ "threads": [...] }` and a top-level array; each entry may
/// be a bare message list or a `{ "messages": [...] }` object.
pub fn read_threads(path: &Path) -> Result<Vec<ThreadInput>, PipelineError> {
    let doc: Value = read_json(path)?;
    let threads = match doc {
        array @ Value::Array(_) => array,
        Value::Object(mut map) => map
            .remove("threads")
            .ok_or_else(|| PipelineError::malformed(path, "missing `threads` array"))?,
        _ => return Err(PipelineError::malformed(path, "expected an object or array")),
    };
    serde_json::from_value(threads).map_err(|e| PipelineError::malformed(path, e.to_string()))
}
