use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one pipeline run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Hyphen-free form, used for exported file names.
    pub fn simple(&self) -> String {
        self.0.replace('-', "")
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Output format requested from the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// The model must answer with a single JSON object.
    Json,
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// A chunk of thinking/reasoning content.
    ThinkingDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// Message ID from the API.
    MessageId(String),
}

/// Thinking level for extended thinking / reasoning tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl ThinkingLevel {
    /// Budget tokens for Anthropic extended thinking.
    pub fn budget_tokens(&self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Low => 4096,
            Self::Medium => 10240,
            Self::High => 32768,
        }
    }

    /// Reasoning effort string for OpenAI o-series models.
    pub fn reasoning_effort(&self) -> &str {
        match self {
            Self::Off => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A single hit returned by a search backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Synthesised research on one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchReport {
    pub content: String,
    pub query: String,
    pub source: String,
    pub timestamp: String,
    /// URLs consulted while researching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ResearchReport {
    pub fn new(query: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            query: query.into(),
            source: source.into(),
            timestamp: Utc::now().to_rfc3339(),
            sources: vec![],
        }
    }
}

/// A researched article section. Subsections are researched the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SectionDraft {
    pub heading: String,
    /// Working text: starts as the research synthesis, replaced by revisions.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<ResearchReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<SectionDraft>,
    /// Set instead of research when the section could not be researched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SectionDraft {
    pub fn failed(heading: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Events broadcast while a pipeline run progresses.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted { run_id: RunId, query: String },
    NodeStarted { node: String },
    NodeFinished { node: String, succeeded: bool, elapsed_ms: u64 },
    /// Progress line from one of the agents.
    AgentLog { agent: String, message: String },
    ReviewFeedback { section: String, feedback: Option<String> },
    Published { format: String, path: PathBuf },
    RunComplete { run_id: RunId, output_dir: PathBuf, started_at: DateTime<Utc> },
    RunError { run_id: RunId, error: String },
}
