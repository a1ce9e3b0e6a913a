//! Mocks and fixtures shared by the penwright test suites.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::{json, Value};

use penwright_core::config::{AppConfig, ModelConfig};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::traits::{LlmClient, Searcher};
use penwright_core::types::*;

/// Scripted LLM: answers from routing rules, then from a FIFO queue.
///
/// Rules match on a substring of any message in the request, which keeps
/// answers deterministic when agents call the model concurrently.
pub struct ScriptedLlm {
    rules: Vec<(String, String)>,
    queue: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    models: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            rules: vec![],
            queue: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            requests: Mutex::new(vec![]),
            models: Mutex::new(vec![]),
        }
    }

    /// Answer `response` whenever a message contains `needle`.
    pub fn route(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    /// Answer used once rules and queue are exhausted.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }

    /// Model id of every request, in arrival order.
    pub fn models(&self) -> Vec<String> {
        lock(&self.models).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn answer(&self, messages: &[ChatMessage]) -> Option<String> {
        for (needle, response) in &self.rules {
            if messages.iter().any(|m| m.content.contains(needle.as_str())) {
                return Some(response.clone());
            }
        }
        lock(&self.queue)
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        _format: ResponseFormat,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let answer = self.answer(&messages);
        lock(&self.requests).push(messages);
        lock(&self.models).push(config.model_id.clone());
        Box::pin(async move {
            let text = answer
                .ok_or_else(|| PenwrightError::LlmRequest("scripted LLM exhausted".into()))?;
            // Split in two chunks so consumers exercise delta concatenation.
            let mid = text
                .char_indices()
                .nth(text.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (a, b) = text.split_at(mid);
            let deltas = vec![
                Ok(StreamDelta::TextDelta(a.to_string())),
                Ok(StreamDelta::TextDelta(b.to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// Searcher returning canned hits and recording queries.
#[derive(Default)]
pub struct MockSearcher {
    hits: Vec<(String, Vec<SearchHit>)>,
    fail_on: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits for queries containing `needle`.
    pub fn with_hits(mut self, needle: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.hits.push((needle.into(), hits));
        self
    }

    /// Fail any query containing `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

impl Searcher for MockSearcher {
    fn name(&self) -> &str {
        "mock"
    }

    fn search(&self, query: &str, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        lock(&self.queries).push(query.to_string());
        let query = query.to_string();
        Box::pin(async move {
            if self.fail_on.iter().any(|n| query.contains(n.as_str())) {
                return Err(PenwrightError::Search(format!("mock failure for '{query}'")));
            }
            let mut hits = self
                .hits
                .iter()
                .find(|(needle, _)| query.contains(needle.as_str()))
                .map(|(_, hits)| hits.clone())
                .unwrap_or_else(|| vec![hit(&query)]);
            hits.truncate(max_results);
            Ok(hits)
        })
    }
}

/// A single search hit about `topic`.
pub fn hit(topic: &str) -> SearchHit {
    SearchHit {
        title: format!("About {topic}"),
        url: format!("https://example.com/{}", topic.replace(' ', "-").to_lowercase()),
        snippet: format!("Background material on {topic}."),
    }
}

pub fn test_model_config() -> ModelConfig {
    test_app_config(Path::new("reports")).model
}

/// Config with fast, deterministic settings writing under `output_root`.
pub fn test_app_config(output_root: &Path) -> AppConfig {
    let toml_str = format!(
        r#"
[model]
provider = "openai"
model_id = "test-model"
api_key = "sk-test"

[pipeline]
max_revisions = 2
max_plan_revisions = 2
max_parallel_sections = 2
llm_json_retries = 3
output_root = "{}"
"#,
        output_root.display().to_string().replace('\\', "/")
    );
    // The literal above is always valid TOML.
    toml::from_str(&toml_str).unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

/// Scratch directory removed on drop.
pub fn temp_workspace() -> tempfile::TempDir {
    tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"))
}

/// Editor plan with the given section headings.
pub fn plan_json(title: &str, headings: &[&str]) -> String {
    let sections: Vec<Value> = headings
        .iter()
        .map(|h| json!({"heading": h, "content": format!("Cover {h}")}))
        .collect();
    json!({
        "metadata": {"title": title, "description": format!("All about {title}"), "tags": ["test"]},
        "content": {
            "introduction": {"hook": "Hook", "context": "Context", "thesis": "Thesis"},
            "main_content": sections,
            "conclusion": {"summary": "Summary", "call_to_action": "Go"}
        }
    })
    .to_string()
}

/// Writer article with the given section headings.
pub fn article_json(title: &str, headings: &[&str]) -> String {
    let sections: Vec<Value> = headings
        .iter()
        .map(|h| {
            json!({
                "heading": h,
                "content": format!("Body of {h}."),
                "subsections": [{"subheading": format!("{h} detail"), "content": "Detail."}]
            })
        })
        .collect();
    json!({
        "metadata": {"title": title, "description": "Desc", "tags": ["a", "b"]},
        "content": {
            "introduction": {"hook": "Hook line", "context": "Why now", "thesis": "Main claim"},
            "main_content": sections,
            "conclusion": {"summary": "Wrap up", "call_to_action": "Try it"}
        },
        "references": {
            "sources": [{"citation": "Doe, J. (2025). Paper.", "url": "https://example.com/paper"}],
            "additional_resources": [{"title": "Book", "url": "https://example.com/book"}]
        }
    })
    .to_string()
}
