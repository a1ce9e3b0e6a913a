pub mod providers;
pub mod retry;
pub mod streaming;

use futures::StreamExt;
use tracing::debug;

use penwright_core::config::{AppConfig, ModelConfig};
use penwright_core::error::{PenwrightError, Result};
use penwright_core::traits::LlmClient;
use penwright_core::types::{ChatMessage, ResponseFormat, StopReason, StreamDelta};

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    }
}

/// Primary client wrapped with retries and the configured fallback models.
pub fn build_client(config: &AppConfig) -> Box<dyn LlmClient> {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    Box::new(RetryingClient::new(
        create_client(&config.model),
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    ))
}

/// Run a chat request to completion and return the concatenated text.
pub async fn complete(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
    format: ResponseFormat,
) -> Result<String> {
    let mut stream = llm.chat_stream(config, messages, format).await?;
    let mut text = String::new();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::Stop(StopReason::MaxTokens) => {
                debug!(model = %config.model_id, "Response truncated at max_tokens");
            }
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                debug!(input_tokens, output_tokens, "Token usage");
            }
            _ => {}
        }
    }

    if text.trim().is_empty() {
        return Err(PenwrightError::LlmParse(format!(
            "empty response from {}",
            config.model_id
        )));
    }
    Ok(text)
}
