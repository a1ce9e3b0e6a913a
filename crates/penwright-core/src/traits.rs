use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Multi-provider streaming LLM client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Search backend used for web research.
pub trait Searcher: Send + Sync + 'static {
    /// Backend name (e.g., "tavily").
    fn name(&self) -> &str;

    /// Run a query and return up to `max_results` hits.
    fn search(&self, query: &str, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}
