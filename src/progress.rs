//! Stage progress reporting.
//!
//! Long-running stages (embedding chunks, analyzing threads) report how
//! far along they are. Progress is emitted on **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A stage started for a channel. Total unknown.
    Started { channel: String, stage: &'static str },
    /// `n` of `total` items of a stage are done.
    Advanced {
        channel: String,
        stage: &'static str,
        n: u64,
        total: u64,
    },
}

/// Reports stage progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "hardware  embed  1,200 / 5,000".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { channel, stage } => {
                format!("{}  {}  starting...\n", channel, stage)
            }
            ProgressEvent::Advanced {
                channel,
                stage,
                n,
                total,
            } => format!(
                "{}  {}  {} / {}\n",
                channel,
                stage,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { channel, stage } => serde_json::json!({
                "event": "progress",
                "channel": channel,
                "stage": stage,
                "phase": "started"
            }),
            ProgressEvent::Advanced {
                channel,
                stage,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "channel": channel,
                "stage": stage,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value. `None` picks the TTY default.
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some("off") => Ok(ProgressMode::Off),
            Some(other) => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be human, json, or off.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
