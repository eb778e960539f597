// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic Messages API adapter
//!
//! The native protocol: canonical content parts map one-to-one onto the
//! backend's content blocks, and tool results travel as `tool_result` blocks
//! inside a user turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{
    parse_numeric_token_counts, parse_retry_after_seconds, server_error, sse_event_stream,
};
use crate::error::{ApiError, Result, UnfoldError};
use crate::llm::message::{ContentPart, Message, Role};
use crate::llm::provider::{
    BlockStart, CompletionRequest, CompletionResponse, ContentDelta, EventStream, ProtocolAdapter,
    StopReason, StreamEvent, ToolDefinition, Usage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the native Anthropic protocol
pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    /// Create a new adapter
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, ANTHROPIC_API_URL)
    }

    /// Create with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Convert canonical messages to wire messages
    fn to_wire(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User | Role::ToolResult => "user",
                    Role::Assistant => "assistant",
                };
                let content = m
                    .parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => {
                            AnthropicContentBlock::Text { text: text.clone() }
                        }
                        ContentPart::ToolCallRequest {
                            call_id,
                            tool_name,
                            arguments,
                        } => AnthropicContentBlock::ToolUse {
                            id: call_id.clone(),
                            name: tool_name.clone(),
                            input: arguments.clone(),
                        },
                        ContentPart::ToolCallResult { call_id, content } => {
                            AnthropicContentBlock::ToolResult {
                                tool_use_id: call_id.clone(),
                                content: content.clone(),
                            }
                        }
                    })
                    .collect();

                AnthropicMessage {
                    role: role.to_string(),
                    content,
                }
            })
            .collect()
    }

    /// Convert wire messages back to canonical messages
    fn from_wire(messages: Vec<AnthropicMessage>) -> Vec<Message> {
        messages
            .into_iter()
            .map(|m| {
                let all_results = !m.content.is_empty()
                    && m
                        .content
                        .iter()
                        .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }));
                let role = match (m.role.as_str(), all_results) {
                    ("assistant", _) => Role::Assistant,
                    (_, true) => Role::ToolResult,
                    _ => Role::User,
                };
                Message {
                    role,
                    parts: m.content.into_iter().map(block_to_part).collect(),
                }
            })
            .collect()
    }

    /// Convert tools to wire format
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.to_json(),
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            messages: Self::to_wire(&request.messages),
            system: request.system.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(Self::convert_tools(&request.tools))
            },
            stream,
        }
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after_seconds(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body, retry_after));
        }

        Ok(response)
    }

    /// Parse an error response
    fn parse_error(status: u16, body: &str, retry_after: Option<u64>) -> UnfoldError {
        let Ok(error_response) = serde_json::from_str::<AnthropicError>(body) else {
            return server_error(status, body);
        };
        let message = error_response.error.message;
        match error_response.error.error_type.as_str() {
            "authentication_error" | "permission_error" => {
                UnfoldError::Api(ApiError::AuthenticationFailed)
            }
            "rate_limit_error" => {
                UnfoldError::Api(ApiError::RateLimited(retry_after.unwrap_or(10) as u32))
            }
            "not_found_error" => UnfoldError::Api(ApiError::ModelNotFound(message)),
            "invalid_request_error" => {
                if message.contains("context")
                    || message.contains("too long")
                    || message.contains("tokens") && message.contains("maximum")
                {
                    let (current, limit) = parse_numeric_token_counts(&message);
                    UnfoldError::Api(ApiError::ContextTooLong { current, limit })
                } else {
                    UnfoldError::Api(ApiError::InvalidResponse(message))
                }
            }
            _ => server_error(status, message),
        }
    }
}

fn block_to_part(block: AnthropicContentBlock) -> ContentPart {
    match block {
        AnthropicContentBlock::Text { text } => ContentPart::Text { text },
        AnthropicContentBlock::ToolUse { id, name, input } => ContentPart::ToolCallRequest {
            call_id: id,
            tool_name: name,
            arguments: input,
        },
        AnthropicContentBlock::ToolResult {
            tool_use_id,
            content,
        } => ContentPart::ToolCallResult {
            call_id: tool_use_id,
            content,
        },
    }
}

#[async_trait]
impl ProtocolAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| UnfoldError::Api(ApiError::InvalidResponse(e.to_string())))?;

        tracing::debug!(
            id = %api_response.id,
            blocks = api_response.content.len(),
            stop_reason = ?api_response.stop_reason,
            "anthropic response"
        );

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            message: Message::assistant_parts(
                api_response.content.into_iter().map(block_to_part).collect(),
            ),
            stop_reason: api_response.stop_reason.as_deref().map(StopReason::from_native),
            usage: api_response
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;
        Ok(sse_event_stream(response, "\n\n", |record| {
            parse_sse_event(record).into_iter().collect()
        }))
    }
}

fn parse_usage(value: &serde_json::Value) -> Option<Usage> {
    if value.is_null() {
        return None;
    }
    Some(Usage::new(
        value["input_tokens"].as_u64().unwrap_or(0),
        value["output_tokens"].as_u64().unwrap_or(0),
    ))
}

/// Parse a Server-Sent Event
fn parse_sse_event(event_str: &str) -> Option<StreamEvent> {
    let mut event_type = None;
    let mut data = None;

    for line in event_str.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data = Some(rest.trim().to_string());
        }
    }

    let event_type = event_type?;
    let parsed: serde_json::Value = match data {
        Some(data) => serde_json::from_str(&data).ok()?,
        None => serde_json::Value::Null,
    };

    match event_type.as_str() {
        "message_start" => Some(StreamEvent::MessageStart {
            id: parsed["message"]["id"].as_str()?.to_string(),
            model: parsed["message"]["model"].as_str().unwrap_or("").to_string(),
            usage: parse_usage(&parsed["message"]["usage"]),
        }),
        "content_block_start" => {
            let index = parsed["index"].as_u64()? as usize;
            let block = &parsed["content_block"];

            let block = match block["type"].as_str()? {
                "text" => BlockStart::Text {
                    text: block["text"].as_str().unwrap_or("").to_string(),
                },
                "tool_use" => BlockStart::ToolCall {
                    call_id: block["id"].as_str()?.to_string(),
                    tool_name: block["name"].as_str()?.to_string(),
                },
                _ => return None,
            };

            Some(StreamEvent::ContentBlockStart { index, block })
        }
        "content_block_delta" => {
            let index = parsed["index"].as_u64()? as usize;
            let delta = &parsed["delta"];

            let delta = match delta["type"].as_str()? {
                "text_delta" => ContentDelta::Text {
                    text: delta["text"].as_str()?.to_string(),
                },
                "input_json_delta" => ContentDelta::Arguments {
                    partial_json: delta["partial_json"].as_str()?.to_string(),
                },
                _ => return None,
            };

            Some(StreamEvent::ContentBlockDelta { index, delta })
        }
        "content_block_stop" => {
            let index = parsed["index"].as_u64()? as usize;
            Some(StreamEvent::ContentBlockStop { index })
        }
        "message_delta" => Some(StreamEvent::MessageDelta {
            stop_reason: parsed["delta"]["stop_reason"]
                .as_str()
                .map(StopReason::from_native),
            usage: parse_usage(&parsed["usage"]),
        }),
        "message_stop" => Some(StreamEvent::MessageStop),
        "ping" => Some(StreamEvent::Ping),
        "error" => Some(StreamEvent::Error {
            error_type: parsed["error"]["type"].as_str()?.to_string(),
            message: parsed["error"]["message"].as_str().unwrap_or("").to_string(),
        }),
        _ => None,
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
