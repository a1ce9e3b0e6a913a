use thiserror::Error;

#[derive(Debug, Error)]
pub enum PenwrightError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Research errors
    #[error("Research failed for '{query}': {message}")]
    Research { query: String, message: String },

    #[error("Search provider error: {0}")]
    Search(String),

    #[error("No research topic provided (available keys: {0})")]
    MissingTopic(String),

    // Pipeline errors
    #[error("Generated plan is invalid: {0}")]
    InvalidPlan(String),

    #[error("Article failed validation: {0}")]
    InvalidArticle(String),

    #[error("Invalid headers: {0}")]
    InvalidHeaders(String),

    #[error("Workflow node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    #[error("Workflow error: {0}")]
    Workflow(String),

    // Task errors
    #[error("Task file not found: {0}")]
    TaskNotFound(String),

    #[error("No task found in the file: {0}")]
    EmptyTask(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    // Export errors
    #[error("Export to {format} failed: {message}")]
    Export { format: String, message: String },

    #[error("Watcher error: {0}")]
    Watch(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Human review
    #[error("Human review failed: {0}")]
    Review(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PenwrightError>;
