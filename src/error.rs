//! Boundary error kinds.
//!
//! Loaders and HTTP collaborators return these wrapped in
//! [`anyhow::Error`]; callers that need to classify a failure recover the
//! kind with `err.downcast_ref::<PipelineError>()`.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("malformed input in {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("{service} request failed: {message}")]
    UpstreamServiceError { service: String, message: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::MalformedInput {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::UpstreamServiceError {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Short stable name of the kind, used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InputNotFound { .. } => "InputNotFound",
            PipelineError::MalformedInput { .. } => "MalformedInput",
            PipelineError::UpstreamServiceError { .. } => "UpstreamServiceError",
            PipelineError::Io { .. } => "Io",
        }
    }
}

/// Read a whole input file, mapping a missing file to
/// [`PipelineError::InputNotFound`].
pub fn read_input(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PipelineError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            PipelineError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Read and deserialize a JSON input file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let text = read_input(path)?;
    serde_json::from_str(&text).map_err(|e| PipelineError::malformed(path, e.to_string()))
}

/// Serialize `value` as pretty JSON, creating parent directories.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::malformed(path, e.to_string()))?;
    write_text(path, &text)
}

pub fn write_text(path: &Path, text: &str) -> Result<(), PipelineError> {
    let io_err = |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    std::fs::write(path, text).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_input_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = read_input(&tmp.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), "InputNotFound");
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn bad_json_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn write_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b").join("out.json");
        write_json(&path, &serde_json::json!({"ok": true})).unwrap();
        let back: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(back["ok"], true);
    }

    #[test]
    fn kinds_survive_anyhow() {
        let err: anyhow::Error = PipelineError::upstream("ollama", "503").into();
        let kind = err.downcast_ref::<PipelineError>().map(PipelineError::kind);
        assert_eq!(kind, Some("UpstreamServiceError"));
    }
}
