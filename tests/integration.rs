use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn threadline_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_threadline"))
}

const EXPORT: &str = r#"{
  "guild": {"id": "1", "name": "Lab"},
  "channel": {"id": "10", "name": "hardware"},
  "messages": [
    {"id": "100", "type": "Default", "timestamp": "2025-03-01T10:00:00+00:00",
     "content": "Found an exposed JTAG header on the router board",
     "author": {"id": "u1", "name": "alice"}},
    {"id": "101", "type": "Reply", "timestamp": "2025-03-01T10:01:00+00:00",
     "content": "Which SoC is it?", "author": {"id": "u2", "name": "bob"},
     "reference": {"messageId": "100"}},
    {"id": "102", "type": "Default", "timestamp": "2025-03-01T10:03:00+00:00",
     "content": "Looks like a MT7621, pins are labelled",
     "author": {"id": "u1", "name": "alice"}},
    {"id": "103", "type": "Reply", "timestamp": "2025-03-01T10:04:00+00:00",
     "content": "Try openocd with the mips config", "author": {"id": "u3", "name": "carol"},
     "reference": {"messageId": "102"}},
    {"id": "200", "type": "Default", "timestamp": "2025-03-01T18:00:00+00:00",
     "content": "Anyone dumped SPI flash with a CH341A?",
     "author": {"id": "u4", "name": "dave"}},
    {"id": "300", "type": "Default", "timestamp": "2025-03-02T09:00:00+00:00",
     "content": "good morning", "author": {"id": "u5", "name": "erin"}}
  ]
}"#;

const FILTERED: &str = r#"{
  "query": "hardware hacking",
  "threshold": 0.55,
  "results": [
    {"text": "Anyone dumped SPI flash", "metadata": {"id": "200", "author": "dave"}, "similarity": 0.71},
    {"text": "Found an exposed JTAG", "metadata": {"id": "100", "author": "alice"}, "similarity": 0.66},
    {"text": "openocd", "metadata": {"id": "103", "author": "carol"}, "similarity": 0.58}
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let exports = root.join("exports");
    let output = root.join("output");
    fs::create_dir_all(&exports).unwrap();
    fs::create_dir_all(&output).unwrap();
    fs::write(exports.join("hardware_export.json"), EXPORT).unwrap();
    fs::write(output.join("hardware_filtered_messages.json"), FILTERED).unwrap();

    let config_content = format!(
        r#"[paths]
export_dir = "{}/exports"
output_dir = "{}/output"

[channels]
names = ["hardware", "firmware"]

[threading]
time_window_secs = 300
min_thread_size = 3
"#,
        root.display(),
        root.display()
    );

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("threadline.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_threadline(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = threadline_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run threadline at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_thread_builds_conversations() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_threadline(&config, &["thread", "hardware"]);
    assert!(success, "thread failed: {}", stderr);
    assert!(stdout.contains("Threads:             2"), "stdout: {}", stdout);

    let doc = read_json(&tmp.path().join("output/hardware_threaded_conversations.json"));
    assert_eq!(doc["statistics"]["totalThreads"], 2);
    assert_eq!(doc["statistics"]["totalMessages"], 5);
    assert_eq!(doc["substantialThreads"], 1);

    // The JTAG conversation: both seeds collapse into one thread.
    let thread = &doc["threads"][0];
    assert_eq!(thread["id"], 1);
    assert_eq!(thread["rootMessageId"], "100");
    let ids: Vec<&str> = thread["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["100", "101", "102", "103"]);
    assert_eq!(thread["participants"], serde_json::json!(["alice", "bob", "carol"]));
    assert_eq!(thread["messages"][0]["isSeed"], true);
    assert_eq!(thread["messages"][1]["isSeed"], false);

    let text =
        fs::read_to_string(tmp.path().join("output/hardware_threaded_conversations.txt")).unwrap();
    assert!(text.contains("THREAD #1"));
    assert!(text.contains("* [1] alice"));
}

#[test]
fn test_thread_window_override() {
    let (tmp, config) = setup_test_env();
    let (_, stderr, success) = run_threadline(
        &config,
        &["thread", "hardware", "--window-secs", "60", "--min-size", "1"],
    );
    assert!(success, "thread failed: {}", stderr);

    let doc = read_json(&tmp.path().join("output/hardware_threaded_conversations.json"));
    // 102 is only reachable through the 180s same-author gap; 103 is its
    // own seed and pulls 102 in by reply.
    assert_eq!(doc["statistics"]["totalThreads"], 3);
    assert_eq!(doc["metadata"]["timeWindowSecs"], 60);
}

#[test]
fn test_stats_reads_threaded_file() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_threadline(&config, &["thread", "hardware", "--min-size", "1"]);
    assert!(success, "thread failed: {}", stderr);

    let (stdout, stderr, success) = run_threadline(&config, &["stats", "hardware"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Threads:                 2"), "stdout: {}", stdout);
    assert!(stdout.contains("Avg messages/thread:     2.5"), "stdout: {}", stdout);
    assert!(stdout.contains("Single-message threads:  1"), "stdout: {}", stdout);
}

#[test]
fn test_findings_ranks_across_channels() {
    let (tmp, config) = setup_test_env();
    let analysis = |channel: &str, protocols: &[&str]| {
        serde_json::json!({
            "channel": channel,
            "threadsAnalyzed": 3,
            "aggregatedFindings": {
                "vulnerabilities": [],
                "techniques": ["chip-off"],
                "hardware": [],
                "protocols": protocols
            },
            "detailedAnalyses": []
        })
    };
    fs::write(
        tmp.path().join("output/hardware_analysis.json"),
        analysis("hardware", &["JTAG", "SPI"]).to_string(),
    )
    .unwrap();
    fs::write(
        tmp.path().join("output/firmware_analysis.json"),
        analysis("firmware", &["SPI"]).to_string(),
    )
    .unwrap();

    let (stdout, stderr, success) = run_threadline(&config, &["findings"]);
    assert!(success, "findings failed: {}", stderr);
    assert!(stdout.contains("SPI (2 channels)"), "stdout: {}", stdout);
    assert!(stdout.contains("JTAG (1 channel)"), "stdout: {}", stdout);

    let summary = read_json(&tmp.path().join("output/TOP_FINDINGS_SUMMARY.json"));
    assert_eq!(summary["totalThreads"], 6);
    assert_eq!(summary["protocols"]["unique"], 2);
    assert_eq!(summary["protocols"]["top"][0]["name"], "SPI");
}

#[test]
fn test_missing_export_is_input_not_found() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_threadline(&config, &["thread", "firmware"]);
    assert!(!success);
    assert!(stderr.contains("input not found"), "stderr: {}", stderr);
}

#[test]
fn test_malformed_filtered_file() {
    let (tmp, config) = setup_test_env();
    fs::write(
        tmp.path().join("output/hardware_filtered_messages.json"),
        "{ not json",
    )
    .unwrap();
    let (_, stderr, success) = run_threadline(&config, &["thread", "hardware"]);
    assert!(!success);
    assert!(stderr.contains("malformed input"), "stderr: {}", stderr);
}

#[test]
fn test_init_refuses_overwrite() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config/threadline.toml");

    let (stdout, stderr, success) = run_threadline(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Created"));
    assert!(config.exists());

    let (_, stderr, success) = run_threadline(&config, &["init"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup_test_env();
    fs::write(&config, "[threading]\ntime_window_secs = -5\n").unwrap();
    let (_, stderr, success) = run_threadline(&config, &["stats", "hardware"]);
    assert!(!success);
    assert!(stderr.contains("time_window_secs"), "stderr: {}", stderr);
}
