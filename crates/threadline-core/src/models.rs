//! Core data models used throughout Threadline.
//!
//! These types represent the chat messages loaded from an export, the
//! relevance marks produced by the filter stage, and the threads built
//! from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A chat message as loaded from the message store.
///
/// Messages are read-only inputs: the thread builder never mutates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    /// Id of the message this one replies to. May point at a message
    /// that is not present in the store.
    pub reply_to: Option<String>,
}

impl Message {
    /// Canonical author key used for time-proximity grouping.
    pub fn author_key(&self) -> &str {
        &self.author_id
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

/// A message flagged relevant by the filter stage.
///
/// Only `message_id` drives threading. The score and channel are carried
/// through for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevantMark {
    pub message_id: String,
    pub similarity: f32,
    pub channel: Option<String>,
}

impl RelevantMark {
    pub fn new(message_id: impl Into<String>, similarity: f32) -> Self {
        Self {
            message_id: message_id.into(),
            similarity,
            channel: None,
        }
    }
}

/// A message as it appears inside an emitted thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    #[serde(deserialize_with = "deserialize_author")]
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    /// True when the message was itself marked relevant.
    #[serde(default, alias = "isFiltered")]
    pub is_seed: bool,
    #[serde(default)]
    pub is_reply: bool,
}

/// A conversation thread: a set of messages connected to at least one
/// relevant seed by reply chains or same-author time proximity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// 1-based sequence number, stable only within one run.
    pub id: usize,
    /// The seed whose traversal produced this thread.
    pub root_message_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    /// Sorted ascending by timestamp.
    pub messages: Vec<ThreadMessage>,
    pub participants: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Thread {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn seed_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_seed).count()
    }

    /// Whole minutes between the first and last message.
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// A thread as read back by downstream stages.
///
/// Threaded files have been written both as bare message lists and as
/// `{ "messages": [...] }` objects; both shapes deserialize here and
/// [`ThreadInput::messages`] gives uniform access.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThreadInput {
    Bare(Vec<ThreadMessage>),
    Wrapped {
        #[serde(default)]
        id: Option<usize>,
        #[serde(default)]
        channel: Option<String>,
        messages: Vec<ThreadMessage>,
    },
}

impl ThreadInput {
    pub fn messages(&self) -> &[ThreadMessage] {
        match self {
            ThreadInput::Bare(messages) => messages,
            ThreadInput::Wrapped { messages, .. } => messages,
        }
    }

    pub fn into_messages(self) -> Vec<ThreadMessage> {
        match self {
            ThreadInput::Bare(messages) => messages,
            ThreadInput::Wrapped { messages, .. } => messages,
        }
    }

    pub fn id(&self) -> Option<usize> {
        match self {
            ThreadInput::Bare(_) => None,
            ThreadInput::Wrapped { id, .. } => *id,
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }
}

impl From<Thread> for ThreadInput {
    fn from(thread: Thread) -> Self {
        ThreadInput::Wrapped {
            id: Some(thread.id),
            channel: thread.channel,
            messages: thread.messages,
        }
    }
}

/// Accepts an author written either as a plain name or as an object
/// carrying `name` / `username` / `id`.
fn deserialize_author<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AuthorField {
        Name(String),
        Object {
            #[serde(default)]
            name: Option<String>,
            #[serde(default)]
            username: Option<String>,
            #[serde(default)]
            id: Option<String>,
        },
    }

    Ok(match AuthorField::deserialize(deserializer)? {
        AuthorField::Name(name) => name,
        AuthorField::Object { name, username, id } => {
            name.or(username).or(id).unwrap_or_default()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_input_accepts_bare_list() {
        let json = r#"[
            {"id": "1", "author": "alice", "timestamp": "2025-01-01T10:00:00Z", "content": "hi"},
            {"id": "2", "author": "bob", "timestamp": "2025-01-01T10:01:00Z", "content": "yo"}
        ]"#;
        let input: ThreadInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input.id(), None);
        assert_eq!(input.messages()[1].author, "bob");
    }

    #[test]
    fn thread_input_accepts_wrapped_object() {
        let json = r#"{
            "id": 7,
            "rootMessageId": "1",
            "participants": ["alice"],
            "messages": [
                {"id": "1", "author": {"id": "u1", "name": "alice"},
                 "timestamp": "2025-01-01T10:00:00Z", "content": "hi", "isSeed": true}
            ]
        }"#;
        let input: ThreadInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.id(), Some(7));
        let messages = input.into_messages();
        assert_eq!(messages[0].author, "alice");
        assert!(messages[0].is_seed);
    }

    #[test]
    fn legacy_is_filtered_flag_reads_as_seed() {
        let json = r#"{"id": "1", "author": "a", "timestamp": "2025-01-01T10:00:00Z",
                       "content": "", "isFiltered": true}"#;
        let msg: ThreadMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_seed);
    }

    #[test]
    fn author_object_falls_back_to_username() {
        let json = r#"{"id": "1", "author": {"id": "9", "username": "carol"},
                       "timestamp": "2025-01-01T10:00:00Z"}"#;
        let msg: ThreadMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.author, "carol");
        assert_eq!(msg.content, "");
    }

    #[test]
    fn thread_serializes_camel_case() {
        let ts = DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let thread = Thread {
            id: 1,
            root_message_id: "1".into(),
            channel: Some("general".into()),
            messages: vec![ThreadMessage {
                id: "1".into(),
                author: "alice".into(),
                timestamp: ts,
                content: "hi".into(),
                is_seed: true,
                is_reply: false,
            }],
            participants: vec!["alice".into()],
            start_time: ts,
            end_time: ts,
        };
        let value = serde_json::to_value(&thread).unwrap();
        assert_eq!(value["rootMessageId"], "1");
        assert_eq!(value["messages"][0]["isSeed"], true);
        assert!(value.get("startTime").is_some());
        assert_eq!(thread.duration_minutes(), 0);
    }
}
