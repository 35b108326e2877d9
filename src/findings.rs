//! Cross-channel top findings.
//!
//! Reads every configured channel's analysis document and ranks each
//! finding category by the number of channels it was reported in.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use threadline_core::analysis::{rank_findings, AggregatedFindings, RankedFinding};

use crate::analyze::ChannelAnalysis;
use crate::config::Config;
use crate::error::{read_json, write_json, PipelineError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRanking {
    pub unique: usize,
    pub top: Vec<RankedFinding>,
}

/// The `TOP_FINDINGS_SUMMARY.json` document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingsSummary {
    pub generated: DateTime<Utc>,
    pub channels: Vec<String>,
    pub missing_channels: Vec<String>,
    pub total_threads: usize,
    pub vulnerabilities: CategoryRanking,
    pub techniques: CategoryRanking,
    pub hardware: CategoryRanking,
    pub protocols: CategoryRanking,
}

impl FindingsSummary {
    fn from_documents(docs: &[ChannelAnalysis], missing: Vec<String>, top_n: usize) -> Self {
        FindingsSummary {
            generated: Utc::now(),
            channels: docs.iter().map(|d| d.channel.clone()).collect(),
            missing_channels: missing,
            total_threads: docs.iter().map(|d| d.threads_analyzed).sum(),
            vulnerabilities: rank_category(docs, top_n, |f| f.vulnerabilities.as_slice()),
            techniques: rank_category(docs, top_n, |f| f.techniques.as_slice()),
            hardware: rank_category(docs, top_n, |f| f.hardware.as_slice()),
            protocols: rank_category(docs, top_n, |f| f.protocols.as_slice()),
        }
    }
}

fn rank_category(
    docs: &[ChannelAnalysis],
    top_n: usize,
    pick: fn(&AggregatedFindings) -> &[String],
) -> CategoryRanking {
    let ranking = rank_findings(docs.iter().map(|d| pick(&d.aggregated_findings)), top_n);
    CategoryRanking {
        unique: ranking.unique,
        top: ranking.top,
    }
}

/// Build and write the summary for `config.channels.names`.
///
/// Channels without an analysis document are skipped with a warning; a
/// document that exists but cannot be parsed is an error.
pub fn summarize_findings(config: &Config) -> Result<FindingsSummary> {
    if config.channels.names.is_empty() {
        bail!("No channels configured. Add names under [channels] in the config file.");
    }

    let mut docs = Vec::new();
    let mut missing = Vec::new();
    for channel in &config.channels.names {
        match read_json::<ChannelAnalysis>(&config.analysis_path(channel)) {
            Ok(doc) => docs.push(doc),
            Err(PipelineError::InputNotFound { path }) => {
                tracing::warn!(
                    channel = %channel,
                    path = %path.display(),
                    "no analysis file; skipping"
                );
                missing.push(channel.clone());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let summary = FindingsSummary::from_documents(&docs, missing, config.analysis.top_n);
    write_json(&config.findings_path(), &summary)?;
    Ok(summary)
}

/// `threadline findings`.
pub fn run_findings(config: &Config) -> Result<()> {
    let summary = summarize_findings(config)?;

    println!("Top findings across {} channels", summary.channels.len());
    println!("  Threads analyzed: {}", summary.total_threads);
    if !summary.missing_channels.is_empty() {
        println!("  Missing analyses: {}", summary.missing_channels.join(", "));
    }

    for (title, ranking) in [
        ("Vulnerabilities", &summary.vulnerabilities),
        ("Techniques", &summary.techniques),
        ("Hardware", &summary.hardware),
        ("Protocols", &summary.protocols),
    ] {
        println!();
        println!("{} ({} unique)", title, ranking.unique);
        for (i, finding) in ranking.top.iter().enumerate() {
            println!(
                "  {:>2}. {} ({} channel{})",
                i + 1,
                finding.name,
                finding.channels,
                if finding.channels == 1 { "" } else { "s" }
            );
        }
    }

    println!();
    println!("Saved {}", config.findings_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channel_doc(channel: &str, hardware: &[&str]) -> ChannelAnalysis {
        ChannelAnalysis {
            channel: channel.into(),
            threads_analyzed: 2,
            aggregated_findings: AggregatedFindings {
                hardware: hardware.iter().map(|h| h.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn ranks_across_channels() {
        let docs = vec![
            channel_doc("a", &["ESP32", "STM32"]),
            channel_doc("b", &["STM32"]),
        ];
        let summary = FindingsSummary::from_documents(&docs, vec![], 20);
        assert_eq!(summary.total_threads, 4);
        assert_eq!(summary.hardware.unique, 2);
        assert_eq!(summary.hardware.top[0].name, "STM32");
        assert_eq!(summary.hardware.top[0].channels, 2);
        assert!(summary.protocols.top.is_empty());
    }

    #[test]
    fn missing_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.paths.output_dir = tmp.path().to_path_buf();
        config.channels.names = vec!["a".into(), "gone".into()];
        write_json(&config.analysis_path("a"), &channel_doc("a", &["ESP32"])).unwrap();

        let summary = summarize_findings(&config).unwrap();
        assert_eq!(summary.channels, vec!["a"]);
        assert_eq!(summary.missing_channels, vec!["gone"]);
        assert!(config.findings_path().exists());
    }

    #[test]
    fn no_channels_is_an_error() {
        assert!(summarize_findings(&Config::minimal()).is_err());
    }
}
