//! Relevance-seeded conversation threading.
//!
//! Reconstructs conversation threads from a flat list of chat messages
//! and the subset flagged relevant by the filter stage. Two kinds of
//! edge connect messages:
//!
//! - **Reply edges**: a message and the message it replies to, in both
//!   directions (parent and children).
//! - **Time-proximity edges**: two messages by the same author whose
//!   timestamps are at most `time_window` apart.
//!
//! Both edge kinds form a single reachability relation. Each relevant
//! seed, processed in ascending timestamp order, claims every unclaimed
//! message reachable from it. Windows are re-centred on every visited
//! message, so a slow conversation can drift well past one window as
//! long as each hop stays within it.
//!
//! # Algorithm
//!
//! 1. Index the store: id → position, parent id → replying positions,
//!    author → positions sorted by timestamp. Duplicate ids keep their
//!    first occurrence.
//! 2. Collapse relevance marks to one seed per message id and sort the
//!    seeds by timestamp (stable, so ties keep input order).
//! 3. For every unclaimed seed, walk the graph breadth-first from it.
//! 4. Drop already-claimed messages from the visited set, claim the
//!    rest, sort them by timestamp and emit a thread.
//!
//! Messages not reachable from any seed are never emitted. Thread-size
//! thresholds belong to the report stage, not here.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{Message, RelevantMark, Thread, ThreadMessage};

/// Default proximity window for single-channel threading (5 minutes).
pub const DEFAULT_TIME_WINDOW_SECS: i64 = 5 * 60;

/// Largest window `Duration` can hold at millisecond precision.
const MAX_WINDOW_SECS: i64 = i64::MAX / 1_000;

/// Tunable threading parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreaderConfig {
    /// Maximum gap between two same-author messages for them to be
    /// grouped. The bound is inclusive.
    pub time_window: Duration,
}

impl ThreaderConfig {
    /// Window of `secs` seconds, clamped to `[0, MAX_WINDOW_SECS]`.
    pub fn with_window_secs(secs: i64) -> Self {
        Self {
            time_window: Duration::seconds(secs.clamp(0, MAX_WINDOW_SECS)),
        }
    }
}

impl Default for ThreaderConfig {
    fn default() -> Self {
        Self::with_window_secs(DEFAULT_TIME_WINDOW_SECS)
    }
}

/// Read-only lookup structure over the message store.
///
/// Positions refer to the de-duplicated message list, which preserves
/// input order.
pub struct MessageIndex<'a> {
    messages: Vec<&'a Message>,
    by_id: HashMap<&'a str, usize>,
    replies_to: HashMap<&'a str, Vec<usize>>,
    by_author: HashMap<&'a str, Vec<usize>>,
}

impl<'a> MessageIndex<'a> {
    pub fn new(all: &'a [Message]) -> Self {
        let mut messages = Vec::with_capacity(all.len());
        let mut by_id = HashMap::with_capacity(all.len());

        for msg in all {
            if by_id.contains_key(msg.id.as_str()) {
                warn!(message_id = %msg.id, "duplicate message id; keeping first occurrence");
                continue;
            }
            by_id.insert(msg.id.as_str(), messages.len());
            messages.push(msg);
        }

        let mut replies_to: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_author: HashMap<&str, Vec<usize>> = HashMap::new();
        for (pos, msg) in messages.iter().enumerate() {
            if let Some(parent) = msg.reply_to.as_deref() {
                replies_to.entry(parent).or_default().push(pos);
            }
            by_author.entry(msg.author_key()).or_default().push(pos);
        }
        for positions in by_author.values_mut() {
            positions.sort_by_key(|&pos| (messages[pos].timestamp, pos));
        }

        Self {
            messages,
            by_id,
            replies_to,
            by_author,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message(&self, pos: usize) -> &'a Message {
        self.messages[pos]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Position of the message `pos` replies to. A reference to an id
    /// missing from the store yields `None`.
    pub fn parent(&self, pos: usize) -> Option<usize> {
        let parent_id = self.messages[pos].reply_to.as_deref()?;
        let parent = self.position(parent_id);
        if parent.is_none() {
            debug!(
                message_id = %self.messages[pos].id,
                parent_id,
                "reply references a message outside the store"
            );
        }
        parent
    }

    /// Positions of messages replying to the message at `pos`.
    pub fn replies(&self, pos: usize) -> &[usize] {
        self.replies_to
            .get(self.messages[pos].id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Positions of same-author messages within `window` of `pos`,
    /// including `pos` itself.
    pub fn same_author_within(&self, pos: usize, window: Duration) -> &[usize] {
        let msg = self.messages[pos];
        let Some(positions) = self.by_author.get(msg.author_key()) else {
            return &[];
        };
        let window = window.max(Duration::zero());
        // Saturate at the ends of the representable date range.
        let lo = msg
            .timestamp
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let hi = msg
            .timestamp
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let start = positions.partition_point(|&p| self.messages[p].timestamp < lo);
        let end = positions.partition_point(|&p| self.messages[p].timestamp <= hi);
        &positions[start..end]
    }
}

/// One relevance seed after collapsing duplicate marks.
struct Seed<'m> {
    pos: usize,
    channel: Option<&'m str>,
}

/// Builds conversation threads from a message store and a relevance set.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use threadline_core::models::{Message, RelevantMark};
/// use threadline_core::thread::{ThreadBuilder, ThreaderConfig};
///
/// let at = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
/// let msg = |id: &str, reply: Option<&str>, s| Message {
///     id: id.into(),
///     author_id: id.into(),
///     author_name: id.into(),
///     timestamp: at(s),
///     content: String::new(),
///     reply_to: reply.map(str::to_string),
/// };
/// let messages = vec![msg("a", None, 0), msg("b", Some("a"), 60)];
///
/// let threads = ThreadBuilder::new(ThreaderConfig::default())
///     .build(&messages, &[RelevantMark::new("a", 0.9)]);
/// assert_eq!(threads.len(), 1);
/// assert_eq!(threads[0].messages.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    config: ThreaderConfig,
}

impl ThreadBuilder {
    pub fn new(config: ThreaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThreaderConfig {
        &self.config
    }

    /// Build disjoint threads covering every relevant message.
    ///
    /// Threads are returned in seed order and numbered from 1. Relevant
    /// ids absent from `messages` are skipped with a warning.
    pub fn build(&self, messages: &[Message], relevant: &[RelevantMark]) -> Vec<Thread> {
        let index = MessageIndex::new(messages);
        let seeds = collect_seeds(&index, relevant);
        let seed_positions: HashSet<usize> = seeds.iter().map(|s| s.pos).collect();

        let mut claimed = vec![false; index.len()];
        let mut threads = Vec::new();

        for seed in &seeds {
            if claimed[seed.pos] {
                continue;
            }

            let visited = self.traverse(&index, seed.pos);
            let mut members: Vec<usize> = visited
                .into_iter()
                .filter(|&pos| !claimed[pos])
                .collect();
            for &pos in &members {
                claimed[pos] = true;
            }
            if members.is_empty() {
                continue;
            }
            members.sort_by_key(|&pos| (index.message(pos).timestamp, pos));

            let thread = make_thread(
                threads.len() + 1,
                &index,
                seed,
                &members,
                &seed_positions,
            );
            debug!(
                thread_id = thread.id,
                messages = thread.len(),
                seeds = thread.seed_count(),
                "built thread"
            );
            threads.push(thread);
        }

        threads
    }

    /// Breadth-first walk over reply and time-proximity edges.
    ///
    /// Returns positions in visit order. The visited set bounds the walk
    /// even when reply references form a cycle.
    fn traverse(&self, index: &MessageIndex<'_>, start: usize) -> Vec<usize> {
        let mut frontier = VecDeque::from([start]);
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        while let Some(current) = frontier.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);

            if let Some(parent) = index.parent(current) {
                if !visited.contains(&parent) {
                    frontier.push_back(parent);
                }
            }
            for &child in index.replies(current) {
                if !visited.contains(&child) {
                    frontier.push_back(child);
                }
            }
            for &near in index.same_author_within(current, self.config.time_window) {
                if !visited.contains(&near) {
                    frontier.push_back(near);
                }
            }
        }

        order
    }
}

/// Resolve relevance marks to seeds: one per message id, in ascending
/// timestamp order with ties kept in mark order.
fn collect_seeds<'m>(index: &MessageIndex<'_>, relevant: &'m [RelevantMark]) -> Vec<Seed<'m>> {
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();

    for mark in relevant {
        let Some(pos) = index.position(&mark.message_id) else {
            warn!(message_id = %mark.message_id, "relevant message not found in store; skipping");
            continue;
        };
        if !seen.insert(pos) {
            continue;
        }
        seeds.push(Seed {
            pos,
            channel: mark.channel.as_deref(),
        });
    }

    seeds.sort_by_key(|seed| index.message(seed.pos).timestamp);
    seeds
}

fn make_thread(
    id: usize,
    index: &MessageIndex<'_>,
    seed: &Seed<'_>,
    members: &[usize],
    seed_positions: &HashSet<usize>,
) -> Thread {
    let mut participants = Vec::new();
    let mut seen_authors = HashSet::new();
    let mut messages = Vec::with_capacity(members.len());

    for &pos in members {
        let msg = index.message(pos);
        if seen_authors.insert(msg.author_key()) {
            participants.push(msg.author_name.clone());
        }
        messages.push(ThreadMessage {
            id: msg.id.clone(),
            author: msg.author_name.clone(),
            timestamp: msg.timestamp,
            content: msg.content.clone(),
            is_seed: seed_positions.contains(&pos),
            is_reply: msg.is_reply(),
        });
    }

    let start_time = messages[0].timestamp;
    let end_time = messages[messages.len() - 1].timestamp;

    Thread {
        id,
        root_message_id: index.message(seed.pos).id.clone(),
        channel: seed.channel.map(str::to_string),
        messages,
        participants,
        start_time,
        end_time,
    }
}
