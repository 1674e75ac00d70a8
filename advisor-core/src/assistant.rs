//! Assistant: request orchestration
//!
//! Router → general path (cache → enhanced prompt → context → model) or
//! chart path (synthesize → screen → execute → persist). The cache wraps the
//! general path only. Every step is a single attempt; failures become
//! `success = false` replies with a message specific to the failure kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::artifacts::ArtifactStore;
use crate::cache::ResponseCache;
use crate::classifier::CategoryRouter;
use crate::config::{expand_path, AdvisorConfig};
use crate::context::{conversation_stats, ContextAssembler, ConversationStats};
use crate::error::{AdvisorError, PipelineError};
use crate::llm::{ChatModel, OpenRouterClient};
use crate::models::{
    Artifact, AssistantReply, Category, CategoryPrediction, ChatTurn, ExecutionFailure,
};
use crate::onnx_classifier::load_category_model;
use crate::sandbox::SandboxExecutor;
use crate::screen::screen;
use crate::synth::CodeSynthesizer;
use crate::tokenizer::{load_token_counter, TokenCounter};

/// Category reported for canned answers.
pub const QUICK_RESPONSE_CATEGORY: &str = "quick_response";

/// Tag used for persisted chart files.
pub const CHART_TAG: &str = "graph";

const BASE_PROMPT: &str = "You are a business consultant for small businesses. Answer briefly and to the point. Use lists of 2-4 items. Be specific and practical.";

const QUICK_RESPONSES: &[(&str, &str)] = &[
    (
        "привет",
        "Здравствуйте! Я ваш бизнес-помощник. Задавайте вопросы по маркетингу, финансам, юриспруденции или управлению бизнесом.",
    ),
    ("спасибо", "Пожалуйста! Обращайтесь, если понадобится ещё помощь."),
    (
        "помощь",
        "Я консультирую по вопросам бизнеса: маркетинг, финансы, юридические аспекты, управление. Задайте конкретный вопрос!",
    ),
    (
        "hello",
        "Hello! I am your business assistant. Ask me about marketing, finance, legal matters or running your business.",
    ),
    (
        "hi",
        "Hello! I am your business assistant. Ask me about marketing, finance, legal matters or running your business.",
    ),
    ("thanks", "You're welcome! Come back any time you need more help."),
    ("thank you", "You're welcome! Come back any time you need more help."),
    (
        "help",
        "I advise on business questions: marketing, finance, legal aspects and management. Ask a specific question!",
    ),
];

fn category_prompt(category: Category) -> &'static str {
    match category {
        Category::Marketing => {
            "You are an expert in marketing and business promotion. Answer briefly and practically, with a focus on measurable results."
        }
        Category::Finance => {
            "You are a financial consultant for small and medium businesses. Be precise with figures and calculations."
        }
        Category::Legal => {
            "You are a legal consultant on business law. Word things carefully and point out risks."
        }
        Category::Management => {
            "You are an expert in business and team management. Give practical, actionable advice."
        }
        Category::Sales => {
            "You are a sales and customer relations specialist. Suggest concrete techniques and scripts."
        }
        Category::General | Category::Graphic => {
            "You are a general business consultant for small businesses. Answer briefly, in a structured way and to the point."
        }
    }
}

/// Canned answer for greetings, thanks and help requests.
pub fn quick_response(question: &str) -> Option<&'static str> {
    let key = question.trim().to_lowercase();
    QUICK_RESPONSES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, answer)| *answer)
}

/// System prompt for the general path: base + category guidance + routing note.
pub fn enhanced_system_prompt(prediction: &CategoryPrediction) -> String {
    format!(
        "{BASE_PROMPT}\n\n{}\n\n[Category: {}, confidence: {:.1}%]",
        category_prompt(prediction.label),
        prediction.label,
        prediction.confidence() * 100.0
    )
}

/// Component status for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub classifier_loaded: bool,
    pub token_counter: String,
    pub chat_model: String,
    pub interpreter: String,
    pub cache_entries: usize,
    pub cache_capacity: usize,
}

pub struct Assistant {
    router: CategoryRouter,
    cache: ResponseCache<AssistantReply>,
    model: Arc<dyn ChatModel>,
    assembler: ContextAssembler,
    token_budget: usize,
    synthesizer: CodeSynthesizer,
    executor: SandboxExecutor,
    store: ArtifactStore,
    exec_timeout: Duration,
}

impl Assistant {
    /// Wire the pipeline around an already-built model, router and counter.
    pub fn new(
        config: &AdvisorConfig,
        model: Arc<dyn ChatModel>,
        router: CategoryRouter,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            router,
            cache: ResponseCache::new(config.cache.capacity, config.cache.ttl()),
            synthesizer: CodeSynthesizer::new(Arc::clone(&model)),
            model,
            assembler: ContextAssembler::new(counter),
            token_budget: config.context.token_budget,
            executor: SandboxExecutor::from_config(&config.execution),
            store: ArtifactStore::new(expand_path(&config.assets.root)),
            exec_timeout: config.execution.timeout(),
        }
    }

    /// Build every component from configuration.
    ///
    /// A missing classifier or tokenizer degrades to the heuristics; a missing
    /// API key is an error.
    pub fn from_config(config: &AdvisorConfig) -> Result<Self, AdvisorError> {
        let model: Arc<dyn ChatModel> = Arc::new(OpenRouterClient::from_config(&config.llm)?);
        let router = CategoryRouter::new(load_category_model(&config.classifier.model_path));
        let counter = load_token_counter(&config.context.tokenizer_path);
        Ok(Self::new(config, model, router, counter))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn conversation_stats(&self, history: &[ChatTurn]) -> ConversationStats {
        conversation_stats(history, self.assembler.counter())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            classifier_loaded: self.router.is_ready(),
            token_counter: self.assembler.counter().name().to_string(),
            chat_model: self.model.name().to_string(),
            interpreter: self.executor.interpreter().to_string(),
            cache_entries: self.cache.len(),
            cache_capacity: self.cache.capacity(),
        }
    }

    /// Answer a question. Only an empty question is returned as `Err`;
    /// downstream failures are reported inside the reply.
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<AssistantReply, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        if let Some(answer) = quick_response(question) {
            tracing::debug!("Quick response");
            return Ok(reply(QUICK_RESPONSE_CATEGORY, BTreeMap::new(), answer.to_string()));
        }

        let prediction = self.router.classify(question).await;
        tracing::info!(
            category = %prediction.label,
            confidence = prediction.confidence(),
            history = history.len(),
            "Routing question"
        );

        if prediction.label == Category::Graphic {
            return Ok(self.chart_reply(question, &prediction).await);
        }

        Ok(self.general_reply(question, history, &prediction).await)
    }

    /// Render a chart regardless of how the description would be classified.
    pub async fn chart(&self, description: &str) -> Result<AssistantReply, PipelineError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let prediction = CategoryPrediction {
            label: Category::Graphic,
            probabilities: BTreeMap::from([(Category::Graphic, 1.0)]),
        };
        Ok(self.chart_reply(description, &prediction).await)
    }

    // ========================================================================
    // General path
    // ========================================================================

    async fn general_reply(
        &self,
        question: &str,
        history: &[ChatTurn],
        prediction: &CategoryPrediction,
    ) -> AssistantReply {
        if let Some(mut hit) = self.cache.get(question) {
            tracing::info!(category = %hit.category, "Serving answer from cache");
            hit.cached = true;
            return hit;
        }

        let stats = self.conversation_stats(history);
        tracing::debug!(
            turns = stats.total_messages,
            tokens = stats.estimated_tokens,
            "Conversation window"
        );

        let system_prompt = enhanced_system_prompt(prediction);
        let messages = self
            .assembler
            .assemble(&system_prompt, history, question, self.token_budget);

        match self.model.complete(&messages).await {
            Ok(text) => {
                let answer = reply(prediction.label.as_str(), labels(prediction), text);
                self.cache.set(question, answer.clone());
                answer
            }
            Err(e) => {
                tracing::error!(model = self.model.name(), error = %e, "Model call failed");
                let err = PipelineError::from(e);
                failure(prediction, &err)
            }
        }
    }

    // ========================================================================
    // Chart path
    // ========================================================================

    async fn chart_reply(
        &self,
        description: &str,
        prediction: &CategoryPrediction,
    ) -> AssistantReply {
        match self.render_chart(description).await {
            Ok(artifact) => {
                let mut answer = reply(
                    prediction.label.as_str(),
                    labels(prediction),
                    format!("Chart generated for: {description}"),
                );
                answer.image_reference = Some(artifact.relative_path);
                answer
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Chart request failed");
                failure(prediction, &e)
            }
        }
    }

    async fn render_chart(&self, description: &str) -> Result<Artifact, PipelineError> {
        let code = self
            .synthesizer
            .synthesize(description)
            .await?
            .ok_or(PipelineError::SynthesisEmpty)?;

        screen(&code)?;

        let result = self.executor.execute(&code, self.exec_timeout).await;
        match result.error {
            None => {}
            Some(ExecutionFailure::Timeout) => {
                return Err(PipelineError::ExecutionTimeout {
                    seconds: self.exec_timeout.as_secs(),
                })
            }
            Some(ExecutionFailure::ExecutionFailed) => {
                return Err(PipelineError::ExecutionFailed {
                    exit_code: result.exit_code,
                    stderr: result.stderr,
                })
            }
            // A crashed script leaves no file either; its stderr is the useful part.
            Some(ExecutionFailure::NoArtifactProduced) if result.exit_code != Some(0) => {
                return Err(PipelineError::ExecutionFailed {
                    exit_code: result.exit_code,
                    stderr: result.stderr,
                })
            }
            Some(ExecutionFailure::NoArtifactProduced) => {
                return Err(PipelineError::ArtifactMissing)
            }
            Some(ExecutionFailure::Internal(msg)) => {
                return Err(PipelineError::Io(std::io::Error::other(msg)))
            }
        }

        let bytes = result.image_bytes.ok_or(PipelineError::ArtifactMissing)?;
        let mime = result
            .mime_type
            .unwrap_or_else(|| crate::sandbox::ARTIFACT_MIME.to_string());
        Ok(self.store.persist(&bytes, CHART_TAG, &mime).await?)
    }
}

fn labels(prediction: &CategoryPrediction) -> BTreeMap<String, f32> {
    prediction
        .probabilities
        .iter()
        .map(|(c, p)| (c.as_str().to_string(), *p))
        .collect()
}

fn reply(category: &str, probabilities: BTreeMap<String, f32>, text: String) -> AssistantReply {
    AssistantReply {
        success: true,
        category: category.to_string(),
        probabilities,
        text,
        image_reference: None,
        error: None,
        cached: false,
        timestamp: Utc::now(),
    }
}

fn failure(prediction: &CategoryPrediction, err: &PipelineError) -> AssistantReply {
    let mut answer = AssistantReply::failure(prediction.label.as_str(), err.user_message());
    answer.probabilities = labels(prediction);
    answer
}

// ============================================================================
// TESTS
// ============================================================================
