//! # Threadline CLI (`threadline`)
//!
//! ## Usage
//!
//! ```bash
//! threadline --config ./config/threadline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `threadline init` | Write an example configuration file |
//! | `threadline filter <channel>` | Score a channel's messages against the relevance query |
//! | `threadline thread <channel>` | Build conversation threads around relevant messages |
//! | `threadline analyze <channel>` | Extract findings from each thread with an LLM |
//! | `threadline stats <channel>` | Print statistics of a threaded file |
//! | `threadline findings` | Rank findings across all configured channels |
//! | `threadline run` | Filter, thread and analyze every configured channel |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use threadline::config;
use threadline::progress::ProgressMode;
use threadline::threading::ThreadOptions;
use threadline::{analyze, filter, findings, logging, pipeline, stats, threading};

/// Threadline: relevance filtering, conversation threading and LLM
/// analysis for Discord channel exports.
#[derive(Parser)]
#[command(name = "threadline", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/threadline.toml`. Commands that only read
    /// local files fall back to built-in defaults when it is missing.
    #[arg(long, global = true, default_value = "./config/threadline.toml")]
    config: PathBuf,

    /// Log stage milestones (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress on stderr: human, json, or off. Default: human when
    /// stderr is a TTY.
    #[arg(long, global = true, value_name = "MODE")]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file at `--config`.
    Init,

    /// Score a channel's messages against the relevance query.
    Filter { channel: String },

    /// Build conversation threads around a channel's relevant messages.
    Thread {
        channel: String,

        /// Message export to read instead of the configured path.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Filtered results to read instead of the configured path.
        #[arg(long)]
        filtered: Option<PathBuf>,

        /// Same-author time window in seconds.
        #[arg(long)]
        window_secs: Option<i64>,

        /// Minimum messages for a thread to be kept in the output.
        #[arg(long)]
        min_size: Option<usize>,
    },

    /// Extract findings from each substantial thread with an LLM.
    Analyze {
        channel: String,

        /// Analyze at most this many threads.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print statistics of a channel's threaded file.
    Stats {
        channel: String,

        /// Threaded file to read instead of the configured path.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Rank findings across all configured channels.
    Findings,

    /// Filter, thread and analyze several channels.
    Run {
        /// Channel to process (repeatable). Defaults to [channels] names.
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Reuse existing filtered files.
        #[arg(long)]
        skip_filter: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Commands::Init = cli.command {
        return config::scaffold_config(&cli.config);
    }

    let cfg = config::load_or_minimal(&cli.config)?;
    let mode = ProgressMode::from_flag(cli.progress.as_deref())?;
    let reporter = mode.reporter();

    match cli.command {
        Commands::Init => {}
        Commands::Filter { channel } => {
            filter::run_filter(&cfg, &channel, reporter.as_ref()).await?;
        }
        Commands::Thread {
            channel,
            export,
            filtered,
            window_secs,
            min_size,
        } => {
            let opts = ThreadOptions {
                export,
                filtered,
                window_secs,
                min_size,
            };
            threading::run_thread(&cfg, &channel, &opts)?;
        }
        Commands::Analyze { channel, limit } => {
            analyze::run_analyze(&cfg, &channel, limit, reporter.as_ref()).await?;
        }
        Commands::Stats { channel, file } => {
            stats::run_stats(&cfg, &channel, file)?;
        }
        Commands::Findings => {
            findings::run_findings(&cfg)?;
        }
        Commands::Run {
            channels,
            skip_filter,
        } => {
            let opts = pipeline::RunOptions {
                channels,
                skip_filter,
            };
            pipeline::run_batch(&cfg, &opts, reporter.as_ref()).await?;
        }
    }

    Ok(())
}
