//! Message chunking and relevance scoring.
//!
//! Messages are split into fixed-size character chunks so long pastes
//! are scored piecewise. Each chunk is embedded by the app crate and
//! compared to the query vector; chunks at or above the threshold become
//! [`RelevanceResult`]s, which collapse to one [`RelevantMark`] per
//! message for threading.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::models::{Message, RelevantMark};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 500;

/// Identifies the message a chunk or result came from.
///
/// Only `id` is required when reading results back; the rest is
/// informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A piece of a message's content, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk that scored at or above the relevance threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceResult {
    #[serde(default)]
    pub text: String,
    pub metadata: ChunkMetadata,
    #[serde(default)]
    pub similarity: f32,
}

/// Split every non-blank message into chunks of at most `max_chars`
/// characters.
///
/// Splits fall on character boundaries, never inside a UTF-8 sequence.
/// A `max_chars` of zero is treated as one.
pub fn chunk_messages(
    messages: &[Message],
    channel: Option<&str>,
    max_chars: usize,
) -> Vec<MessageChunk> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();

    for msg in messages {
        if msg.content.trim().is_empty() {
            continue;
        }
        let metadata = ChunkMetadata {
            id: msg.id.clone(),
            author: msg.author_name.clone(),
            timestamp: Some(msg.timestamp),
            channel: channel.map(str::to_string),
        };
        for piece in split_chars(&msg.content, max_chars) {
            chunks.push(MessageChunk {
                text: piece.to_string(),
                metadata: metadata.clone(),
            });
        }
    }

    chunks
}

fn split_chars(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Score chunks against the query vector.
///
/// `embeddings[i]` belongs to `chunks[i]`; a `None` entry (failed
/// embedding) is never relevant. Results are sorted by similarity,
/// highest first, with ties kept in chunk order.
pub fn score_chunks(
    query: &[f32],
    chunks: &[MessageChunk],
    embeddings: &[Option<Vec<f32>>],
    threshold: f32,
) -> Vec<RelevanceResult> {
    let mut results: Vec<RelevanceResult> = chunks
        .iter()
        .zip(embeddings.iter())
        .filter_map(|(chunk, embedding)| {
            let similarity = cosine_similarity(query, embedding.as_deref()?);
            (similarity >= threshold).then(|| RelevanceResult {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                similarity,
            })
        })
        .collect();

    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    results
}

/// Collapse results to one mark per message id.
///
/// Marks keep the order in which each id first appears; the highest
/// similarity among a message's chunks is retained. `default_channel`
/// fills in results that carry no channel.
pub fn relevant_marks(
    results: &[RelevanceResult],
    default_channel: Option<&str>,
) -> Vec<RelevantMark> {
    let mut marks: Vec<RelevantMark> = Vec::new();
    let mut by_id: HashMap<&str, usize> = HashMap::new();

    for result in results {
        match by_id.get(result.metadata.id.as_str()).copied() {
            Some(idx) => {
                let mark = &mut marks[idx];
                if result.similarity > mark.similarity {
                    mark.similarity = result.similarity;
                }
            }
            None => {
                by_id.insert(result.metadata.id.as_str(), marks.len());
                marks.push(RelevantMark {
                    message_id: result.metadata.id.clone(),
                    similarity: result.similarity,
                    channel: result
                        .metadata
                        .channel
                        .clone()
                        .or_else(|| default_channel.map(str::to_string)),
                });
            }
        }
    }

    marks
}
