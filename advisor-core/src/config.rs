use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/advisor.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub request_timeout_seconds: u64,
    pub referer: String,
    pub title: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "tngtech/deepseek-r1t2-chimera:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.5,
            request_timeout_seconds: 120,
            referer: "http://localhost:8766".to_string(),
            title: "Business Assistant".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> String {
        std::env::var(&self.api_key_env).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    /// Path to the ONNX classifier. Empty selects the default model directory.
    #[serde(default)]
    pub model_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    pub token_budget: usize,
    /// HuggingFace `tokenizer.json`. Empty falls back to word counting.
    pub tokenizer_path: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 3000,
            tokenizer_path: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_hours: 24,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_seconds: u64,
    pub interpreter: String,
    /// Parent directory for per-run working directories. Empty uses the system temp dir.
    pub scratch_dir: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            interpreter: "python3".to_string(),
            scratch_dir: String::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn scratch_root(&self) -> PathBuf {
        if self.scratch_dir.is_empty() {
            std::env::temp_dir()
        } else {
            expand_path(&self.scratch_dir)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    pub root: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: "assets".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8766,
        }
    }
}

impl AdvisorConfig {
    /// Load from a TOML file (optional) layered under `ADVISOR__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ADVISOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}

/// Expand `~` and `$VAR` in a configured path, keeping the raw string if expansion fails.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "Path expansion failed, using it verbatim");
            PathBuf::from(raw)
        }
    }
}
