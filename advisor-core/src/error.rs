use thiserror::Error;

use crate::llm::LlmError;
use crate::screen::SafetyViolation;

/// Startup and wiring failures.
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Request-level failures of the assistant pipeline.
///
/// Every variant is terminal for its request; nothing here is retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("model returned no code for the chart request")]
    SynthesisEmpty,

    #[error("unsafe code detected: {pattern}")]
    SafetyViolation { pattern: String },

    #[error("execution timed out after {seconds}s")]
    ExecutionTimeout { seconds: u64 },

    #[error("execution failed (exit={exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("execution finished without producing an image")]
    ArtifactMissing,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SafetyViolation> for PipelineError {
    fn from(v: SafetyViolation) -> Self {
        PipelineError::SafetyViolation { pattern: v.pattern }
    }
}

impl PipelineError {
    /// Message shown to the end user. Upstream model failures get distinct wording per kind.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::EmptyQuestion => "Question must not be empty.".to_string(),
            PipelineError::SynthesisEmpty => {
                "Could not generate chart code for this request. Try describing the chart differently."
                    .to_string()
            }
            PipelineError::SafetyViolation { pattern } => {
                format!("Unsafe code detected in generated chart code: {pattern}")
            }
            PipelineError::ExecutionTimeout { seconds } => {
                format!("Chart generation timed out after {seconds} seconds.")
            }
            PipelineError::ExecutionFailed { stderr, .. } => {
                format!("Chart code failed to run: {stderr}")
            }
            PipelineError::ArtifactMissing => {
                "Chart code ran but did not produce an image.".to_string()
            }
            PipelineError::Llm(e) => e.user_message(),
            PipelineError::Io(_) => {
                "Temporary server error. Please try again.".to_string()
            }
        }
    }

    /// Short machine-readable code for logs and envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::EmptyQuestion => "empty_question",
            PipelineError::SynthesisEmpty => "synthesis_empty",
            PipelineError::SafetyViolation { .. } => "safety_violation",
            PipelineError::ExecutionTimeout { .. } => "timeout",
            PipelineError::ExecutionFailed { .. } => "execution_failed",
            PipelineError::ArtifactMissing => "no_artifact_produced",
            PipelineError::Llm(_) => "llm_error",
            PipelineError::Io(_) => "io_error",
        }
    }
}
