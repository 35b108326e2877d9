//! # Threadline Core
//!
//! Shared, I/O-free logic for Threadline: message models, relevance
//! chunking and scoring, the conversation-threading algorithm, thread
//! statistics, and the data shapes exchanged with the LLM analysis stage.
//!
//! This crate contains no tokio, HTTP, filesystem I/O, or other
//! runtime dependencies. Every function here is synchronous and
//! deterministic for a given input.

pub mod analysis;
pub mod embedding;
pub mod models;
pub mod relevance;
pub mod stats;
pub mod thread;

pub use models::{Message, RelevantMark, Thread, ThreadInput, ThreadMessage};
pub use stats::ThreadStats;
pub use thread::{ThreadBuilder, ThreaderConfig};
