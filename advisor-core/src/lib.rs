pub mod artifacts;
pub mod assistant;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod ipc;
pub mod llm;
pub mod models;
pub mod onnx_classifier;
pub mod sandbox;
pub mod screen;
pub mod synth;
pub mod tokenizer;

pub use artifacts::ArtifactStore;
pub use assistant::{Assistant, HealthReport};
pub use cache::ResponseCache;
pub use classifier::{CategoryModel, CategoryRouter, ClassifierError};
pub use config::AdvisorConfig;
pub use context::{ContextAssembler, ConversationStats};
pub use error::{AdvisorError, PipelineError};
pub use llm::{ChatModel, LlmError, OpenRouterClient};
pub use onnx_classifier::OnnxCategoryModel;
pub use sandbox::SandboxExecutor;
pub use screen::{screen, SafetyViolation};
pub use synth::CodeSynthesizer;
pub use tokenizer::{TokenCounter, WordCounter};
