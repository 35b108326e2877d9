//! TOML configuration parsing and validation.
//!
//! Every stage reads its paths and tunables from one file (default
//! `./config/threadline.toml`). All sections are optional; missing keys
//! fall back to the defaults below. [`load_config`] validates ranges and
//! provider names before any stage runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub threading: ThreadingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding `{channel}{export_suffix}` export files.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_export_suffix")]
    pub export_suffix: String,
    /// Directory receiving every stage's output files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            export_suffix: default_export_suffix(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./discord-exports")
}
fn default_export_suffix() -> String {
    "_export.json".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    2
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelevanceConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            threshold: default_threshold(),
            chunk_chars: default_chunk_chars(),
        }
    }
}

fn default_threshold() -> f32 {
    0.55
}
fn default_chunk_chars() -> usize {
    threadline_core::relevance::DEFAULT_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThreadingConfig {
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: i64,
    #[serde(default = "default_min_thread_size")]
    pub min_thread_size: usize,
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            time_window_secs: default_time_window_secs(),
            min_thread_size: default_min_thread_size(),
        }
    }
}

fn default_time_window_secs() -> i64 {
    threadline_core::thread::DEFAULT_TIME_WINDOW_SECS
}
fn default_min_thread_size() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_analysis_model")]
    pub model: String,
    /// Base URL override. Defaults to the provider's public endpoint
    /// (OpenAI) or `http://localhost:11434` (Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_analysis_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_analysis_model(),
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            batch_size: default_analysis_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            timeout_secs: default_analysis_timeout_secs(),
            top_n: default_top_n(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_analysis_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_analysis_timeout_secs() -> u64 {
    60
}
fn default_top_n() -> usize {
    20
}

impl Config {
    /// All-defaults configuration for commands that can run without a
    /// config file.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn export_path(&self, channel: &str) -> PathBuf {
        self.paths
            .export_dir
            .join(format!("{}{}", channel, self.paths.export_suffix))
    }

    pub fn filtered_path(&self, channel: &str) -> PathBuf {
        self.output_file(channel, "filtered_messages.json")
    }

    pub fn filtered_text_path(&self, channel: &str) -> PathBuf {
        self.output_file(channel, "filtered_messages.txt")
    }

    pub fn threaded_path(&self, channel: &str) -> PathBuf {
        self.output_file(channel, "threaded_conversations.json")
    }

    pub fn threaded_text_path(&self, channel: &str) -> PathBuf {
        self.output_file(channel, "threaded_conversations.txt")
    }

    pub fn analysis_path(&self, channel: &str) -> PathBuf {
        self.output_file(channel, "analysis.json")
    }

    pub fn findings_path(&self) -> PathBuf {
        self.paths.output_dir.join("TOP_FINDINGS_SUMMARY.json")
    }

    fn output_file(&self, channel: &str, suffix: &str) -> PathBuf {
        self.paths
            .output_dir
            .join(format!("{}_{}", channel, suffix))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load the config file, or fall back to [`Config::minimal`] when the
/// file does not exist. A file that exists but fails to parse is still
/// an error.
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate threading
    if config.threading.time_window_secs <= 0 {
        anyhow::bail!("threading.time_window_secs must be > 0");
    }
    if config.threading.min_thread_size == 0 {
        anyhow::bail!("threading.min_thread_size must be >= 1");
    }

    // Validate relevance
    if !(-1.0..=1.0).contains(&config.relevance.threshold) {
        anyhow::bail!("relevance.threshold must be in [-1.0, 1.0]");
    }
    if config.relevance.chunk_chars == 0 {
        anyhow::bail!("relevance.chunk_chars must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    // Validate analysis
    match config.analysis.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown analysis provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.analysis.batch_size == 0 {
        anyhow::bail!("analysis.batch_size must be > 0");
    }

    Ok(())
}

/// Commented example configuration written by `threadline init`.
pub const EXAMPLE_CONFIG: &str = r#"# Threadline configuration

[paths]
# Exports are read from {export_dir}/{channel}{export_suffix}
export_dir = "./discord-exports"
export_suffix = "_export.json"
output_dir = "./output"

[channels]
# Channels processed by `threadline run` and `threadline findings`
names = []

[embedding]
# disabled | ollama | openai (openai reads OPENAI_API_KEY)
provider = "ollama"
model = "nomic-embed-text"
url = "http://localhost:11434"
batch_size = 32
max_retries = 2
timeout_secs = 30

[relevance]
query = """
cybersecurity hardware hacking vulnerabilities exploits
JTAG UART SPI I2C firmware reverse engineering
debugging bootloader flash memory encryption
"""
# 0.5 = moderately relevant, 0.6 = highly relevant
threshold = 0.55
chunk_chars = 500

[threading]
# 300 for single-channel threading; 1800 suits sparse cross-channel batches
time_window_secs = 300
min_thread_size = 3

[analysis]
# disabled | ollama | openai
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.3
max_tokens = 2000
batch_size = 5
batch_delay_ms = 1000
timeout_secs = 60
top_n = 20
"#;

/// Write [`EXAMPLE_CONFIG`] to `path`, refusing to overwrite.
pub fn scaffold_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
