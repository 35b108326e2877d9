//! Data shapes for the LLM analysis stage.
//!
//! Renders a thread into an extraction prompt, parses the model's reply
//! into a [`ThreadAnalysis`], and aggregates findings per channel
//! ([`AggregatedFindings`]) and across channels ([`rank_findings`]).

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::ThreadMessage;

/// System prompt sent with every thread analysis request.
pub const SYSTEM_PROMPT: &str = "You are a hardware security expert analyzing Discord \
discussions. Extract structured information and respond only with valid JSON.";

/// Findings extracted from one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadAnalysis {
    #[serde(default, deserialize_with = "string_list")]
    pub vulnerabilities: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub techniques: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub hardware: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Render a thread as a plain-text transcript, one paragraph per message.
pub fn conversation_text(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}: {}",
                m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                m.author,
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the user prompt asking for structured findings.
pub fn analysis_prompt(messages: &[ThreadMessage]) -> String {
    format!(
        r#"Analyze this Discord conversation about hardware/cybersecurity and extract:

1. **Vulnerabilities**: Any security issues, exploits, or weaknesses discussed
2. **Techniques**: Methods, tools, or approaches mentioned
3. **Hardware**: Specific hardware, chips, or devices discussed
4. **Protocols**: Communication protocols or interfaces mentioned (UART, SPI, JTAG, etc.)

Conversation:
{}

Respond in JSON format:
{{
  "vulnerabilities": ["list of vulnerabilities"],
  "techniques": ["list of techniques"],
  "hardware": ["list of hardware"],
  "protocols": ["list of protocols"],
  "summary": "brief summary of the conversation"
}}"#,
        conversation_text(messages)
    )
}

/// Parse a model reply into a [`ThreadAnalysis`].
///
/// The span from the first `{` to the last `}` is parsed as JSON. A reply
/// with no such span is kept verbatim as the summary with empty lists.
///
/// # Errors
///
/// Returns an error when a `{ ... }` span exists but is not a valid
/// analysis object.
pub fn parse_analysis(reply: &str) -> Result<ThreadAnalysis> {
    let span = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Ok(ThreadAnalysis {
                summary: reply.trim().to_string(),
                ..ThreadAnalysis::default()
            })
        }
    };
    serde_json::from_str(span).with_context(|| "Model reply contained invalid analysis JSON")
}

/// De-duplicated findings across the threads of one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFindings {
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub hardware: Vec<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
}

impl AggregatedFindings {
    pub fn from_analyses<'a, I>(analyses: I) -> Self
    where
        I: IntoIterator<Item = &'a ThreadAnalysis>,
    {
        let mut findings = Self::default();
        for analysis in analyses {
            findings.absorb(analysis);
        }
        findings
    }

    /// Add one thread's findings, keeping first-seen order.
    pub fn absorb(&mut self, analysis: &ThreadAnalysis) {
        extend_unique(&mut self.vulnerabilities, &analysis.vulnerabilities);
        extend_unique(&mut self.techniques, &analysis.techniques);
        extend_unique(&mut self.hardware, &analysis.hardware);
        extend_unique(&mut self.protocols, &analysis.protocols);
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// A finding and the number of channels it appeared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedFinding {
    pub name: String,
    pub channels: usize,
}

/// Result of ranking one finding category across channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingRanking {
    pub top: Vec<RankedFinding>,
    pub unique: usize,
}

/// Count how many channel lists contain each finding and keep the
/// `top_n` most frequent. Ties keep first-seen order.
///
/// A finding repeated within one channel's list counts once.
pub fn rank_findings<'a, I>(lists: I, top_n: usize) -> FindingRanking
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut counts: Vec<RankedFinding> = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for list in lists {
        let mut seen_here = HashSet::new();
        for name in list {
            if !seen_here.insert(name.as_str()) {
                continue;
            }
            match positions.get(name.as_str()).copied() {
                Some(idx) => counts[idx].channels += 1,
                None => {
                    positions.insert(name.as_str(), counts.len());
                    counts.push(RankedFinding {
                        name: name.clone(),
                        channels: 1,
                    });
                }
            }
        }
    }

    let unique = counts.len();
    counts.sort_by(|a, b| b.channels.cmp(&a.channels));
    counts.truncate(top_n);

    FindingRanking { top: counts, unique }
}

/// Accepts a list whose items may be strings, objects or other values.
///
/// Objects contribute their `name`, `type` or `description` field, and
/// other values their JSON text. `null` reads as an empty list.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.into_iter().filter_map(value_to_finding).collect())
}

fn value_to_finding(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let text = match value {
        Value::Null => return None,
        Value::String(s) => s,
        Value::Object(map) => ["name", "type", "description"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| Value::Object(map).to_string()),
        other => other.to_string(),
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
