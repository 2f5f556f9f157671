//! Configuration and service factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::engine::EngineConfig;
use examforge_core::traits::{CompletionService, MathService};

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::wolfram::WolframAlpha;

/// Configuration for a single completion provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// Math service settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MathConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for MathConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathConfig")
            .field("app_id", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub math: MathConfig,
    /// Bound on whole-exam generation, in seconds.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    /// Bound on question-level calls, in seconds.
    #[serde(default = "default_question_timeout")]
    pub question_timeout_secs: u64,
    /// Bound on open-answer evaluation and holistic feedback, in seconds.
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_secs: u64,
    /// Retries of the generation call on transient errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Answers verified concurrently while grading.
    #[serde(default = "default_parallelism")]
    pub grading_parallelism: usize,
    /// JSON lines file receiving graded attempts.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_question_timeout() -> u64 {
    30
}
fn default_evaluation_timeout() -> u64 {
    45
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_results_path() -> PathBuf {
    PathBuf::from("./examforge-results/results.jsonl")
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            math: MathConfig::default(),
            generation_timeout_secs: default_generation_timeout(),
            question_timeout_secs: default_question_timeout(),
            evaluation_timeout_secs: default_evaluation_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            grading_parallelism: default_parallelism(),
            results_path: default_results_path(),
        }
    }
}

impl ExamforgeConfig {
    /// Engine settings derived from this configuration; token limits keep
    /// their defaults.
    pub fn engine_config(&self, model: Option<&str>) -> EngineConfig {
        EngineConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            question_timeout: Duration::from_secs(self.question_timeout_secs),
            evaluation_timeout: Duration::from_secs(self.evaluation_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            grading_parallelism: self.grading_parallelism.max(1),
            ..EngineConfig::default()
        }
    }
}

/// Expand `${NAME}` references from the environment. Unset variables expand
/// to nothing; an unterminated reference is kept as written.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&std::env::var(&rest[open + 2..open + close]).unwrap_or_default());
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand(value: &mut String) {
    *value = resolve_env_vars(value);
}

impl ProviderConfig {
    fn expand_env(&mut self) {
        match self {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                org_id,
            } => {
                expand(api_key);
                base_url.iter_mut().chain(org_id.iter_mut()).for_each(expand);
            }
            ProviderConfig::Anthropic { api_key, base_url } => {
                expand(api_key);
                base_url.iter_mut().for_each(expand);
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_OPENAI_KEY`,
/// `EXAMFORGE_ANTHROPIC_KEY`, `EXAMFORGE_WOLFRAM_APP_ID`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("examforge.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ExamforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamforgeConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers.values_mut().for_each(ProviderConfig::expand_env);
    expand(&mut config.math.app_id);
    config.math.base_url.iter_mut().for_each(expand);

    Ok(config)
}

fn apply_env_overrides(config: &mut ExamforgeConfig) {
    let overrides = [
        ("EXAMFORGE_OPENAI_KEY", "openai"),
        ("EXAMFORGE_ANTHROPIC_KEY", "anthropic"),
    ];
    for (var, provider) in overrides {
        let Ok(key) = std::env::var(var) else {
            continue;
        };
        match config.providers.get_mut(provider) {
            Some(ProviderConfig::OpenAI { api_key, .. })
            | Some(ProviderConfig::Anthropic { api_key, .. }) => *api_key = key,
            None => {
                let entry = if provider == "openai" {
                    ProviderConfig::OpenAI {
                        api_key: key,
                        base_url: None,
                        org_id: None,
                    }
                } else {
                    ProviderConfig::Anthropic {
                        api_key: key,
                        base_url: None,
                    }
                };
                config.providers.insert(provider.to_string(), entry);
            }
        }
    }

    if let Ok(app_id) = std::env::var("EXAMFORGE_WOLFRAM_APP_ID") {
        config.math.app_id = app_id;
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create a completion service from its configuration.
pub fn create_completion_service(config: &ProviderConfig) -> Result<Arc<dyn CompletionService>> {
    match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            anyhow::ensure!(!api_key.is_empty(), "anthropic API key is empty");
            Ok(Arc::new(AnthropicProvider::new(api_key, base_url.clone())))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            anyhow::ensure!(!api_key.is_empty(), "openai API key is empty");
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )))
        }
    }
}

/// Create the math service. An empty app id is a configuration error.
pub fn create_math_service(config: &MathConfig) -> Result<Arc<dyn MathService>> {
    anyhow::ensure!(
        !config.app_id.is_empty(),
        "no Wolfram|Alpha app id configured (set [math].app_id or EXAMFORGE_WOLFRAM_APP_ID)"
    );
    Ok(Arc::new(WolframAlpha::new(
        &config.app_id,
        config.base_url.clone(),
    )))
}
