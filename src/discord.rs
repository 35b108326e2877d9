//! Message Store loading.
//!
//! Reads a channel's history from either a Discord export JSON document
//! (`{ channel, messages: [...] }`) or a JSONL archive with one message
//! object per line. Both shapes normalise to [`threadline_core::Message`].

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use threadline_core::Message;

use crate::error::{read_input, PipelineError};

/// Messages of one channel, in file order.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    pub channel: Option<String>,
    pub messages: Vec<Message>,
}

impl MessageStore {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ExportDocument {
    #[serde(default)]
    channel: Option<ExportChannel>,
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportChannel {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: Value,
    timestamp: Value,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    reference: Option<RawReference>,
    #[serde(default)]
    embeds: Vec<RawEmbed>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReference {
    #[serde(default)]
    message_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEmbed {
    #[serde(default)]
    description: Option<String>,
}

/// Load a message store, picking the format by content.
///
/// A file whose first non-blank character is `{` and which parses as a
/// single document with a `messages` array is an export; anything else is
/// read as JSONL.
///
/// # Errors
///
/// [`PipelineError::InputNotFound`] for a missing file and
/// [`PipelineError::MalformedInput`] for unparsable JSON or timestamps.
pub fn load_messages(path: &Path) -> Result<MessageStore> {
    let text = read_input(path)?;
    let store = parse_store(path, &text)?;
    tracing::info!(
        path = %path.display(),
        messages = store.len(),
        "loaded message store"
    );
    Ok(store)
}

fn parse_store(path: &Path, text: &str) -> Result<MessageStore, PipelineError> {
    if let Ok(doc) = serde_json::from_str::<ExportDocument>(text) {
        let messages = doc
            .messages
            .into_iter()
            .map(|raw| convert(path, raw))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(MessageStore {
            channel: doc.channel.and_then(|c| c.name),
            messages,
        });
    }

    if text.trim_start().starts_with('[') {
        return Err(PipelineError::malformed(
            path,
            "expected an export object or one message per line",
        ));
    }

    let mut messages = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawMessage = serde_json::from_str(line).map_err(|e| {
            PipelineError::malformed(path, format!("line {}: {}", lineno + 1, e))
        })?;
        messages.push(convert(path, raw)?);
    }

    Ok(MessageStore {
        channel: None,
        messages,
    })
}

fn convert(path: &Path, raw: RawMessage) -> Result<Message, PipelineError> {
    let id = value_to_id(&raw.id)
        .ok_or_else(|| PipelineError::malformed(path, "message without a usable id"))?;

    let timestamp = parse_timestamp(&raw.timestamp).ok_or_else(|| {
        PipelineError::malformed(
            path,
            format!("message {}: unparsable timestamp {}", id, raw.timestamp),
        )
    })?;

    let author = raw.author.unwrap_or_default();
    let author_name = author
        .name
        .or(author.username)
        .unwrap_or_else(|| "unknown".to_string());
    let author_id = author
        .id
        .as_ref()
        .and_then(value_to_id)
        .unwrap_or_else(|| author_name.clone());

    let mut content = raw.content.unwrap_or_default();
    if content.trim().is_empty() {
        if let Some(desc) = raw.embeds.into_iter().find_map(|e| e.description) {
            content = desc;
        }
    }

    let reply_to = raw
        .reference
        .and_then(|r| r.message_id)
        .as_ref()
        .and_then(value_to_id);

    Ok(Message {
        id,
        author_id,
        author_name,
        timestamp,
        content,
        reply_to,
    })
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an RFC 3339 string, a naive ISO-8601 string (read as UTC), or
/// epoch milliseconds given as a number or numeric string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
        "guild": {"id": "1", "name": "Lab"},
        "channel": {"id": "10", "name": "hardware"},
        "messages": [
            {"id": "100", "type": "Default", "timestamp": "2025-03-01T10:00:00.123+00:00",
             "content": "JTAG pins are exposed", "author": {"id": "u1", "name": "alice"}},
            {"id": "101", "type": "Reply", "timestamp": "2025-03-01T10:01:00+00:00",
             "content": "which board?", "author": {"id": "u2", "name": "bob"},
             "reference": {"messageId": "100", "channelId": "10"}},
            {"id": "102", "timestamp": "2025-03-01T10:02:00", "content": "",
             "author": {"id": "u3", "name": "bot"},
             "embeds": [{"description": "Firmware dump attached"}]}
        ]
    }"#;

    #[test]
    fn parses_export_document() {
        let store = parse_store(Path::new("x.json"), EXPORT).unwrap();
        assert_eq!(store.channel.as_deref(), Some("hardware"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.messages[1].reply_to.as_deref(), Some("100"));
        assert_eq!(store.messages[1].author_id, "u2");
        assert_eq!(store.messages[2].content, "Firmware dump attached");
        assert!(store.messages[0].timestamp < store.messages[1].timestamp);
    }

    #[test]
    fn parses_jsonl_archive() {
        let text = concat!(
            r#"{"id": "1", "channelId": "c", "author": {"id": "9", "username": "carol"}, "content": "UART", "embeds": [], "timestamp": 1700000000000}"#,
            "\n\n",
            r#"{"id": "2", "channelId": "c", "author": {"id": "9", "username": "carol"}, "content": "", "embeds": [{"description": "SPI flash"}], "timestamp": "1700000060000"}"#,
            "\n"
        );
        let store = parse_store(Path::new("x.jsonl"), text).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.messages[0].author_name, "carol");
        assert_eq!(store.messages[1].content, "SPI flash");
        assert_eq!(
            (store.messages[1].timestamp - store.messages[0].timestamp).num_seconds(),
            60
        );
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let text = r#"{"messages": [{"id": "7", "timestamp": "yesterday", "content": "x"}]}"#;
        let err = parse_store(Path::new("x.json"), text).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
        assert!(err.to_string().contains("message 7"));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_store(Path::new("x.json"), "not json at all").unwrap_err();
        assert_eq!(err.kind(), "MalformedInput");
    }

    #[test]
    fn missing_file_is_input_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load_messages(&tmp.path().join("missing.json")).unwrap_err();
        let kind = err.downcast_ref::<PipelineError>().map(PipelineError::kind);
        assert_eq!(kind, Some("InputNotFound"));
    }

    #[test]
    fn timestamp_forms() {
        let a = parse_timestamp(&json!("2025-01-01T00:00:00Z")).unwrap();
        let b = parse_timestamp(&json!("2025-01-01 00:00:00")).unwrap();
        let c = parse_timestamp(&json!(a.timestamp_millis())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_timestamp(&json!(null)).is_none());
    }
}
