use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PenwrightError, Result};
use crate::types::ThinkingLevel;

/// Top-level penwright configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub thinking: ThinkingLevel,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra HTTP headers sent with every request (OpenRouter, proxies).
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

impl ModelConfig {
    /// Copy of this config with a different model id (task-level overrides).
    pub fn with_model_id(&self, model_id: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.model_id = model_id.into();
        config
    }
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Research backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Search provider. Only "tavily" is supported for web research.
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Results requested per search query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Tavily search depth: "basic" or "advanced".
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    /// Maximum characters of local documents handed to the LLM per query.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            max_results: default_max_results(),
            search_depth: default_search_depth(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_max_results() -> usize { 5 }
fn default_search_depth() -> String { "advanced".to_string() }
fn default_max_context_chars() -> usize { 24_000 }

/// Workflow tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Reviewer/reviser rounds per section before a draft is force-accepted.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Human feedback rounds on the plan before it is accepted as-is.
    #[serde(default = "default_max_plan_revisions")]
    pub max_plan_revisions: u32,
    /// Sections researched concurrently.
    #[serde(default = "default_max_parallel_sections")]
    pub max_parallel_sections: usize,
    /// Attempts for LLM calls whose JSON output must validate.
    #[serde(default = "default_llm_json_retries")]
    pub llm_json_retries: u32,
    /// Root directory for per-run report folders.
    #[serde(default = "default_output_root")]
    pub output_root: String,
    /// Author personas (JSON list). Disabled when unset.
    #[serde(default)]
    pub authors_file: Option<String>,
    /// Where the effective task is written / read.
    #[serde(default = "default_task_file")]
    pub task_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            max_plan_revisions: default_max_plan_revisions(),
            max_parallel_sections: default_max_parallel_sections(),
            llm_json_retries: default_llm_json_retries(),
            output_root: default_output_root(),
            authors_file: None,
            task_file: default_task_file(),
        }
    }
}

fn default_max_revisions() -> u32 { 3 }
fn default_max_plan_revisions() -> u32 { 3 }
fn default_max_parallel_sections() -> usize { 4 }
fn default_llm_json_retries() -> u32 { 3 }
fn default_output_root() -> String { "reports".to_string() }
fn default_task_file() -> String { "task.json".to_string() }

/// Publishing defaults, used when a task does not name its formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
        }
    }
}

fn default_formats() -> Vec<String> { vec!["md".to_string()] }

/// Markdown organizer (slugifier) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Folder watched recursively for new Markdown files.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: String,
    /// Folder receiving the renamed files.
    #[serde(default = "default_dest_dir")]
    pub dest_dir: String,
    #[serde(default = "default_stabilize_timeout")]
    pub stabilize_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Remove a source folder once its last file has been moved out.
    #[serde(default = "default_remove_empty_dirs")]
    pub remove_empty_dirs: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            dest_dir: default_dest_dir(),
            stabilize_timeout_secs: default_stabilize_timeout(),
            poll_interval_ms: default_poll_interval(),
            remove_empty_dirs: default_remove_empty_dirs(),
        }
    }
}

fn default_watch_dir() -> String { "reports".to_string() }
fn default_dest_dir() -> String { "reports_md".to_string() }
fn default_stabilize_timeout() -> u64 { 10 }
fn default_poll_interval() -> u64 { 500 }
fn default_remove_empty_dirs() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PenwrightError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| PenwrightError::Config(e.to_string()))
    }

    /// Build a minimal config from well-known environment variables.
    ///
    /// Prefers OpenAI when `OPENAI_API_KEY` is set, then Anthropic.
    pub fn from_env() -> Result<Self> {
        let (provider, model_id, api_key) = if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            ("openai", "gpt-4o", key)
        } else if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            ("anthropic", "claude-sonnet-4-20250514", key)
        } else {
            return Err(PenwrightError::Config(
                "No config file found and neither OPENAI_API_KEY nor ANTHROPIC_API_KEY is set"
                    .into(),
            ));
        };

        Ok(Self {
            model: ModelConfig {
                provider: provider.to_string(),
                model_id: model_id.to_string(),
                api_key: Some(api_key),
                base_url: None,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                thinking: ThinkingLevel::Off,
                retry: Some(RetryConfig::default()),
                extra_headers: HashMap::new(),
            },
            fallback_models: vec![],
            research: ResearchConfig {
                api_key: std::env::var("TAVILY_API_KEY").ok(),
                ..ResearchConfig::default()
            },
            pipeline: PipelineConfig::default(),
            publish: PublishConfig::default(),
            watcher: WatcherConfig::default(),
        })
    }

    /// Root directory under which run folders are created (expands ~).
    pub fn output_root(&self) -> PathBuf {
        expand_home(&self.pipeline.output_root)
    }

    pub fn task_file(&self) -> PathBuf {
        expand_home(&self.pipeline.task_file)
    }

    pub fn authors_file(&self) -> Option<PathBuf> {
        self.pipeline.authors_file.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
