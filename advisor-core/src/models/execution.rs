use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a sandboxed run did not produce a usable chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum ExecutionFailure {
    Timeout,
    NoArtifactProduced,
    ExecutionFailed,
    /// Setup or I/O failure inside the executor itself (scratch dir, spawn, read).
    Internal(String),
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::Timeout => f.write_str("timeout"),
            ExecutionFailure::NoArtifactProduced => f.write_str("no-artifact-produced"),
            ExecutionFailure::ExecutionFailed => f.write_str("execution-failed"),
            ExecutionFailure::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

/// Outcome of one sandboxed run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub image_bytes: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub error: Option<ExecutionFailure>,
}

impl ExecutionResult {
    pub fn failed(error: ExecutionFailure) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }

    /// A run that exited and left a non-empty image behind.
    ///
    /// `success` requires a zero exit code; a non-zero exit keeps the bytes for
    /// diagnostics but is reported as `ExecutionFailed`.
    pub fn with_image(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        image_bytes: Vec<u8>,
        mime_type: &str,
    ) -> Self {
        let success = exit_code == Some(0) && !image_bytes.is_empty();
        Self {
            success,
            exit_code,
            stdout,
            stderr,
            image_bytes: Some(image_bytes),
            mime_type: Some(mime_type.to_string()),
            error: if success {
                None
            } else {
                Some(ExecutionFailure::ExecutionFailed)
            },
        }
    }
}

/// A persisted binary output, referenced by its path relative to the assets root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub relative_path: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}
