//! # Threadline
//!
//! Turns Discord channel history into conversation threads worth reading.
//!
//! Threadline filters a channel's messages for relevance by embedding
//! similarity, reconstructs the conversations around the relevant ones,
//! and asks a language model to extract structured findings from each
//! conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │  Export   │──▶│  Filter   │──▶│  Thread   │──▶│  Analyze  │
//! │ JSON/JSONL│   │ embed+cos │   │  builder  │   │    LLM    │
//! └───────────┘   └───────────┘   └───────────┘   └─────┬─────┘
//!                                                       ▼
//!                                                 ┌───────────┐
//!                                                 │ Findings  │
//!                                                 └───────────┘
//! ```
//!
//! The thread builder and the data shapes live in `threadline-core`, which
//! does no I/O. This crate owns configuration, files, HTTP and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! threadline init                   # write ./config/threadline.toml
//! threadline filter hardware        # score messages against the query
//! threadline thread hardware        # build threads around relevant ones
//! threadline analyze hardware       # extract findings per thread
//! threadline findings               # rank findings across channels
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Boundary error kinds |
//! | [`discord`] | Message store loading |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion providers |
//! | [`filter`] | Relevance filter stage |
//! | [`threading`] | Thread stage |
//! | [`report`] | Threaded JSON and text output |
//! | [`analyze`] | LLM analysis stage |
//! | [`findings`] | Cross-channel findings ranking |
//! | [`stats`] | Thread statistics command |
//! | [`pipeline`] | Multi-channel batch runner |
//! | [`progress`] | Progress reporting |
//! | [`logging`] | Tracing setup |

pub mod analyze;
pub mod config;
pub mod discord;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod findings;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod stats;
pub mod threading;
