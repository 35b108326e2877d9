//! Aggregate statistics over built threads.

use serde::{Deserialize, Serialize};

use crate::models::Thread;

/// Size statistics for a set of threads.
///
/// An empty set reports all zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStats {
    pub total_threads: usize,
    pub total_messages: usize,
    /// Rounded to two decimals.
    pub avg_messages_per_thread: f64,
    pub min_messages: usize,
    pub max_messages: usize,
    pub single_message_threads: usize,
    pub multi_message_threads: usize,
}

impl ThreadStats {
    pub fn from_sizes<I>(sizes: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut stats = ThreadStats::default();
        let mut min = usize::MAX;

        for size in sizes {
            stats.total_threads += 1;
            stats.total_messages += size;
            min = min.min(size);
            stats.max_messages = stats.max_messages.max(size);
            if size == 1 {
                stats.single_message_threads += 1;
            } else if size > 1 {
                stats.multi_message_threads += 1;
            }
        }

        if stats.total_threads > 0 {
            stats.min_messages = min;
            let avg = stats.total_messages as f64 / stats.total_threads as f64;
            stats.avg_messages_per_thread = (avg * 100.0).round() / 100.0;
        }

        stats
    }

    pub fn from_threads(threads: &[Thread]) -> Self {
        Self::from_sizes(threads.iter().map(Thread::len))
    }
}

/// Whether a thread meets the downstream size threshold.
pub fn is_substantial(size: usize, min_size: usize) -> bool {
    size >= min_size
}

/// Keep only threads with at least `min_size` messages.
pub fn filter_substantial(threads: &[Thread], min_size: usize) -> Vec<&Thread> {
    threads
        .iter()
        .filter(|t| is_substantial(t.len(), min_size))
        .collect()
}
