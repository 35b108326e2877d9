//! Thread statistics for a threaded document.
//!
//! Used by `threadline stats` to check what the thread stage produced
//! without opening the JSON.

use std::path::{Path, PathBuf};

use anyhow::Result;
use threadline_core::ThreadStats;

use crate::config::Config;
use crate::report::read_threads;

/// Compute statistics over the threads stored in `path`.
///
/// Counts the threads present in the file, which for a thread-stage
/// output are the substantial ones.
pub fn file_stats(path: &Path) -> Result<ThreadStats> {
    let threads = read_threads(path)?;
    Ok(ThreadStats::from_sizes(threads.iter().map(|t| t.len())))
}

/// `threadline stats <channel>`.
pub fn run_stats(config: &Config, channel: &str, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| config.threaded_path(channel));
    let stats = file_stats(&path)?;

    let meta = std::fs::metadata(&path).ok();
    let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
    let modified = meta
        .and_then(|m| m.modified().ok())
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp());

    println!("Threadline: Thread Stats");
    println!("========================");
    println!();
    println!("  File:        {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!(
        "  Written:     {}",
        modified
            .map(format_ts_relative)
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!();
    println!("  Threads:                 {}", stats.total_threads);
    println!("  Messages:                {}", stats.total_messages);
    println!("  Avg messages/thread:     {}", stats.avg_messages_per_thread);
    println!("  Min messages:            {}", stats.min_messages);
    println!("  Max messages:            {}", stats.max_messages);
    println!("  Single-message threads:  {}", stats.single_message_threads);
    println!("  Multi-message threads:   {}", stats.multi_message_threads);
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
