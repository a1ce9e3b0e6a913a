use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use penwright_core::config::ResearchConfig;
use penwright_core::error::{PenwrightError, Result};
use penwright_core::traits::Searcher;
use penwright_core::types::SearchHit;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Web search through the Tavily API.
pub struct TavilySearcher {
    api_key: String,
    search_depth: String,
    http: reqwest::Client,
}

impl TavilySearcher {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            search_depth: "advanced".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_depth(mut self, depth: &str) -> Self {
        self.search_depth = depth.to_string();
        self
    }
}

/// Build the searcher named in the research config.
pub fn create_searcher(config: &ResearchConfig) -> Result<Box<dyn Searcher>> {
    match config.provider.as_str() {
        "tavily" => {
            let key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("TAVILY_API_KEY").ok())
                .ok_or_else(|| {
                    PenwrightError::Config(
                        "Tavily API key not set ([research].api_key or TAVILY_API_KEY)".into(),
                    )
                })?;
            Ok(Box::new(TavilySearcher::new(&key).with_depth(&config.search_depth)))
        }
        other => Err(PenwrightError::Config(format!(
            "unsupported search provider: {other}"
        ))),
    }
}

/// Extract hits from a Tavily response body.
fn parse_results(body: &serde_json::Value) -> Vec<SearchHit> {
    body["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or("").to_string(),
                    url: r["url"].as_str().unwrap_or("").to_string(),
                    snippet: r["content"].as_str().unwrap_or("").to_string(),
                })
                .filter(|h| !h.url.is_empty() || !h.snippet.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Render hits as LLM context.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".into();
    }
    hits.iter()
        .map(|h| format!("**{}**\n{}\nURL: {}", h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

impl Searcher for TavilySearcher {
    fn name(&self) -> &str {
        "tavily"
    }

    fn search(&self, query: &str, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        let query = query.to_string();
        Box::pin(async move {
            debug!(query = %query, max_results, "Tavily search");
            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": max_results,
                    "search_depth": self.search_depth,
                }))
                .send()
                .await
                .map_err(|e| PenwrightError::Search(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(PenwrightError::Search(format!("HTTP {status}: {text}")));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| PenwrightError::Search(e.to_string()))?;

            Ok(parse_results(&body))
        })
    }
}
