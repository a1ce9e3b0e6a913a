use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use penwright_core::config::ModelConfig;
use penwright_core::error::{PenwrightError, Result};
use penwright_core::traits::LlmClient;
use penwright_core::types::*;

use crate::streaming::SseEvent;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// The Messages API has no JSON mode; the instruction is appended to the system prompt.
const JSON_INSTRUCTION: &str =
    "Respond with a single valid JSON object only. Do not wrap it in code fences or add commentary.";

pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

// Anthropic API request types
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Serialize)]
struct ThinkingConfig {
    r#type: String,
    budget_tokens: u32,
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
#[allow(dead_code)]
enum SseData {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageInfo },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: DeltaInfo },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaInfo, usage: Option<UsageInfo> },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(rename = "ping")]
    Ping {},
    #[serde(rename = "error")]
    Error { error: ApiError },
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct MessageInfo {
    id: String,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum DeltaInfo {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

fn convert_messages(
    messages: Vec<ChatMessage>,
    format: ResponseFormat,
) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts = Vec::new();
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content),
            Role::User => api_msgs.push(ApiMessage {
                role: "user",
                content: msg.content,
            }),
            Role::Assistant => api_msgs.push(ApiMessage {
                role: "assistant",
                content: msg.content,
            }),
        }
    }

    if format == ResponseFormat::Json {
        system_parts.push(JSON_INSTRUCTION.to_string());
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, api_msgs)
}

fn parse_sse_to_delta(event: SseEvent) -> Option<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return None;
    }

    let parsed: std::result::Result<SseData, _> = serde_json::from_str(&event.data);
    match parsed {
        Ok(data) => match data {
            SseData::MessageStart { message } => Some(Ok(StreamDelta::MessageId(message.id))),
            SseData::ContentBlockStart { .. } => None,
            SseData::ContentBlockDelta { delta, .. } => match delta {
                DeltaInfo::TextDelta { text } => Some(Ok(StreamDelta::TextDelta(text))),
                DeltaInfo::ThinkingDelta { thinking } => {
                    Some(Ok(StreamDelta::ThinkingDelta(thinking)))
                }
                DeltaInfo::Other => None,
            },
            SseData::ContentBlockStop { .. } => None,
            SseData::MessageDelta { delta, usage } => {
                let stop = match delta.stop_reason.as_deref() {
                    Some("end_turn") => Some(StopReason::EndTurn),
                    Some("max_tokens") => Some(StopReason::MaxTokens),
                    Some("stop_sequence") => Some(StopReason::StopSequence),
                    _ => None,
                };
                if let Some(usage) = usage {
                    debug!(
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "Token usage"
                    );
                }
                stop.map(|s| Ok(StreamDelta::Stop(s)))
            }
            SseData::MessageStop {} => None,
            SseData::Ping {} => None,
            SseData::Error { error } => Some(Err(PenwrightError::LlmStream(error.message))),
        },
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE data");
            None
        }
    }
}

impl LlmClient for AnthropicClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| PenwrightError::Config("Anthropic API key not set".into()))?;

            let base_url = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

            let (system, api_messages) = convert_messages(messages, format);

            // Build thinking config if enabled
            let thinking = if config.thinking != ThinkingLevel::Off {
                Some(ThinkingConfig {
                    r#type: "enabled".to_string(),
                    budget_tokens: config.thinking.budget_tokens(),
                })
            } else {
                None
            };

            let body = AnthropicRequest {
                model: config.model_id.clone(),
                max_tokens: config.max_tokens,
                // Must NOT send temperature when thinking is enabled (Anthropic constraint)
                temperature: if thinking.is_some() {
                    None
                } else if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                messages: api_messages,
                system,
                stream: true,
                thinking,
            };

            let mut req = self
                .http
                .post(base_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json");

            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .json(&body)
                .send()
                .await
                .map_err(|e| PenwrightError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(PenwrightError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let byte_stream = response.bytes_stream();
            let sse_stream = crate::streaming::SseStream::new(byte_stream);

            let delta_stream =
                sse_stream.filter_map(|event| async move { parse_sse_to_delta(event) });

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn system_messages_are_joined_with_json_instruction() {
        let (system, msgs) = convert_messages(
            vec![ChatMessage::system("You are an editor."), ChatMessage::user("Plan it")],
            ResponseFormat::Json,
        );
        let system = system.unwrap();
        assert!(system.starts_with("You are an editor."));
        assert!(system.ends_with(JSON_INSTRUCTION));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "user");
    }

    #[test]
    fn text_format_leaves_system_alone() {
        let (system, _) = convert_messages(vec![ChatMessage::user("hi")], ResponseFormat::Text);
        assert!(system.is_none());
    }

    #[test]
    fn parses_text_delta() {
        let delta = parse_sse_to_delta(event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        ));
        assert!(matches!(delta, Some(Ok(StreamDelta::TextDelta(t))) if t == "Hi"));
    }

    #[test]
    fn parses_stop_reason() {
        let delta = parse_sse_to_delta(event(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        ));
        assert!(matches!(delta, Some(Ok(StreamDelta::Stop(StopReason::EndTurn)))));
    }

    #[test]
    fn api_error_becomes_stream_error() {
        let delta = parse_sse_to_delta(event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ));
        assert!(matches!(delta, Some(Err(PenwrightError::LlmStream(m))) if m == "Overloaded"));
    }
}
