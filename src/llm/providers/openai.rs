// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat-completions adapter
//!
//! This protocol has no tool-result content type. A tool-result message is
//! exploded into one `tool`-role message per result, correlated by
//! `tool_call_id`, and consecutive `tool` messages are grouped back into a
//! single tool-result message on the way in.
//!
//! Assistant text parts are joined with newlines, so only the canonical
//! assistant shape (at most one non-empty text part, ahead of the tool calls)
//! survives a round trip unchanged. Empty assistant text parts are dropped:
//! they are sent as null content and read back as no text part at all.

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
use crate::llm::streaming::parse_arguments;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Adapter for OpenAI-style chat-completions backends and proxies
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    /// Create a new adapter
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create with a custom endpoint. A bare base such as
    /// `http://localhost:8317/v1` gets `/chat/completions` appended.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.trim_end_matches('/').ends_with("/chat/completions") {
            base_url
        } else {
            format!("{}/chat/completions", base_url.trim_end_matches('/'))
        };
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url,
        }
    }

    /// Convert canonical messages to wire messages, system message first
    fn to_wire(messages: &[Message], system: Option<&str>) -> Vec<OpenAiMessage> {
        let mut result = Vec::new();

        if let Some(sys) = system {
            result.push(OpenAiMessage::plain("system", Some(sys.to_string())));
        }

        for m in messages {
            let only_results = !m.parts.is_empty()
                && m
                    .parts
                    .iter()
                    .all(|p| matches!(p, ContentPart::ToolCallResult { .. }));

            if m.role == Role::ToolResult || (m.role == Role::User && only_results) {
                for part in &m.parts {
                    if let ContentPart::ToolCallResult { call_id, content } = part {
                        result.push(OpenAiMessage {
                            role: "tool".to_string(),
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(call_id.clone()),
                        });
                    }
                }
                continue;
            }

            // Empty assistant text goes out as null content
            let texts: Vec<&str> = m
                .parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .filter(|text| m.role != Role::Assistant || !text.is_empty())
                .collect();
            let content = if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            };

            match m.role {
                Role::Assistant => {
                    let tool_calls: Vec<OpenAiToolCall> = m
                        .tool_calls()
                        .into_iter()
                        .map(|call| OpenAiToolCall {
                            id: call.call_id.to_string(),
                            r#type: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.tool_name.to_string(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect();
                    result.push(OpenAiMessage {
                        role: "assistant".to_string(),
                        content,
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                _ => result.push(OpenAiMessage::plain("user", content)),
            }
        }

        result
    }

    /// Convert wire messages back to canonical messages. System messages are
    /// dropped; consecutive `tool` messages become one tool-result message.
    fn from_wire(messages: Vec<OpenAiMessage>) -> Vec<Message> {
        let mut result: Vec<Message> = Vec::new();

        for m in messages {
            match m.role.as_str() {
                "system" => {}
                "tool" => {
                    let part = ContentPart::tool_result(
                        m.tool_call_id.unwrap_or_default(),
                        m.content.unwrap_or_default(),
                    );
                    match result.last_mut() {
                        Some(last) if last.role == Role::ToolResult => last.parts.push(part),
                        _ => result.push(Message::tool_results(vec![part])),
                    }
                }
                "assistant" => result.push(Message::assistant_parts(assistant_parts(
                    m.content,
                    m.tool_calls.unwrap_or_default(),
                ))),
                _ => result.push(Message {
                    role: Role::User,
                    parts: m.content.into_iter().map(ContentPart::text).collect(),
                }),
            }
        }

        result
    }

    /// Convert tools to wire format
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.to_json(),
                },
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: request.model.clone(),
            messages: Self::to_wire(&request.messages, request.system.as_deref()),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(Self::convert_tools(&request.tools))
            },
            stream,
            stream_options: stream.then_some(OpenAiStreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("Content-Type", "application/json")
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
        let Ok(error_response) = serde_json::from_str::<OpenAiError>(body) else {
            return server_error(status, body);
        };
        let message = error_response.error.message;
        let code = error_response.error.code.as_deref().unwrap_or("");

        match code {
            "invalid_api_key" | "authentication_error" => {
                UnfoldError::Api(ApiError::AuthenticationFailed)
            }
            "rate_limit_exceeded" => {
                UnfoldError::Api(ApiError::RateLimited(retry_after.unwrap_or(60) as u32))
            }
            "context_length_exceeded" => {
                let (current, limit) = parse_numeric_token_counts(&message);
                UnfoldError::Api(ApiError::ContextTooLong { current, limit })
            }
            "model_not_found" => UnfoldError::Api(ApiError::ModelNotFound(message)),
            _ if status == 401 => UnfoldError::Api(ApiError::AuthenticationFailed),
            _ if status == 429 => {
                UnfoldError::Api(ApiError::RateLimited(retry_after.unwrap_or(60) as u32))
            }
            _ => server_error(status, message),
        }
    }
}

/// Build assistant parts from a wire message: text first, then tool calls.
/// Empty content carries no text part.
fn assistant_parts(content: Option<String>, tool_calls: Vec<OpenAiToolCall>) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    if let Some(text) = content.filter(|t| !t.is_empty()) {
        parts.push(ContentPart::text(text));
    }
    for tc in tool_calls {
        parts.push(ContentPart::tool_call(
            tc.id,
            tc.function.name,
            parse_arguments(&tc.function.arguments),
        ));
    }
    parts
}

#[async_trait]
impl ProtocolAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn orders_streamed_calls_by_id(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| UnfoldError::Api(ApiError::InvalidResponse(e.to_string())))?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            UnfoldError::Api(ApiError::InvalidResponse(
                "No choices in response".to_string(),
            ))
        })?;

        tracing::debug!(
            id = %api_response.id,
            finish_reason = ?choice.finish_reason,
            "openai response"
        );

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            message: Message::assistant_parts(assistant_parts(
                choice.message.content,
                choice.message.tool_calls.unwrap_or_default(),
            )),
            stop_reason: choice.finish_reason.as_deref().map(StopReason::from_openai),
            usage: api_response
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;

        let mut parser = ChunkParser::default();
        Ok(sse_event_stream(response, "\n", move |line| {
            parser.parse_line(line)
        }))
    }
}

/// Turns `data:` lines of a chat-completions stream into canonical events.
///
/// Text is unit 0; tool call `i` is unit `i + 1`.
#[derive(Debug, Default)]
struct ChunkParser {
    started: bool,
}

impl ChunkParser {
    fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Vec::new();
        };
        if data == "[DONE]" {
            return vec![StreamEvent::MessageStop];
        }
        match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => self.parse_chunk(chunk),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable stream chunk");
                Vec::new()
            }
        }
    }

    fn parse_chunk(&mut self, chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(error) = chunk.error {
            events.push(StreamEvent::Error {
                error_type: error.code.unwrap_or_else(|| "error".to_string()),
                message: error.message,
            });
            return events;
        }

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                id: chunk.id.clone().unwrap_or_default(),
                model: chunk.model.clone().unwrap_or_default(),
                usage: None,
            });
        }

        let usage = chunk
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        if chunk.choices.is_empty() {
            if usage.is_some() {
                events.push(StreamEvent::MessageDelta {
                    stop_reason: None,
                    usage,
                });
            }
            return events;
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentDelta::Text { text },
                });
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let index = tc.index + 1;
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                if tc.id.is_some() || name.is_some() {
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        block: BlockStart::ToolCall {
                            call_id: tc.id.unwrap_or_default(),
                            tool_name: name.unwrap_or_default(),
                        },
                    });
                }
                if let Some(partial_json) = arguments.filter(|a| !a.is_empty()) {
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::Arguments { partial_json },
                    });
                }
            }

            if let Some(reason) = choice.finish_reason {
                events.push(StreamEvent::MessageDelta {
                    stop_reason: Some(StopReason::from_openai(&reason)),
                    usage,
                });
            }
        }

        events
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAiStreamOptions>,
}

#[derive(Debug, Serialize)]
struct OpenAiStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn plain(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct OpenAiToolCall {
    id: String,
    #[serde(default)]
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::test_support::conversation_strategy;
    use crate::llm::streaming::StreamAssembler;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_conversation() -> Vec<Message> {
        vec![
            Message::user("Analyze the binary at `crackme`."),
            Message::assistant_parts(vec![
                ContentPart::text("Starting with analysis."),
                ContentPart::tool_call("call_1", "analyze_binary", json!({})),
                ContentPart::tool_call("call_2", "decompile", json!({"function": "main"})),
            ]),
            Message::tool_results(vec![
                ContentPart::tool_result("call_1", "ok"),
                ContentPart::tool_result("call_2", "int main() {}"),
            ]),
            Message::assistant("It is a stub."),
        ]
    }

    fn parse_all(lines: &[&str]) -> Vec<StreamEvent> {
        let mut parser = ChunkParser::default();
        lines.iter().flat_map(|l| parser.parse_line(l)).collect()
    }

    #[test]
    fn test_provider_name_and_url() {
        let adapter = OpenAiAdapter::new("key");
        assert_eq!(adapter.name(), "openai");
        assert_eq!(adapter.base_url, OPENAI_API_URL);

        let proxied = OpenAiAdapter::with_base_url("key", "http://localhost:8317/v1/");
        assert_eq!(proxied.base_url, "http://localhost:8317/v1/chat/completions");
    }

    #[test]
    fn test_to_wire_explodes_tool_results() {
        let wire = OpenAiAdapter::to_wire(&sample_conversation(), Some("sys"));
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool", "tool", "assistant"]
        );
        assert_eq!(wire[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(wire[4].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(wire[4].content.as_deref(), Some("int main() {}"));
    }

    #[test]
    fn test_user_message_of_results_is_exploded() {
        let message = Message {
            role: Role::User,
            parts: vec![
                ContentPart::tool_result("a", "1"),
                ContentPart::tool_result("b", "2"),
            ],
        };
        let wire = OpenAiAdapter::to_wire(&[message], None);
        assert_eq!(wire.len(), 2);
        assert!(wire.iter().all(|m| m.role == "tool"));
    }

    #[test]
    fn test_assistant_text_joined_and_null_when_empty() {
        let joined = Message::assistant_parts(vec![
            ContentPart::text("one"),
            ContentPart::text("two"),
        ]);
        let calls_only = Message::assistant_parts(vec![ContentPart::tool_call(
            "c1",
            "get_strings",
            json!({}),
        )]);
        let wire = OpenAiAdapter::to_wire(&[joined, calls_only], None);
        assert_eq!(wire[0].content.as_deref(), Some("one\ntwo"));
        assert_eq!(wire[1].content, None);

        let json = serde_json::to_value(&wire[1]).unwrap();
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(json["tool_calls"][0]["type"], "function");
    }

    #[test]
    fn test_empty_assistant_text_is_dropped() {
        let message = Message::assistant_parts(vec![
            ContentPart::text(""),
            ContentPart::tool_call("c1", "decompile", json!({"function": "main"})),
        ]);
        let wire = OpenAiAdapter::to_wire(&[message], None);
        assert_eq!(wire[0].content, None);
        assert!(serde_json::to_value(&wire[0]).unwrap()["content"].is_null());

        let restored = OpenAiAdapter::from_wire(wire);
        assert_eq!(
            restored,
            vec![Message::assistant_parts(vec![ContentPart::tool_call(
                "c1",
                "decompile",
                json!({"function": "main"}),
            )])]
        );

        // An assistant reply that was only empty text reads back with no parts
        let wire = OpenAiAdapter::to_wire(&[Message::assistant("")], None);
        assert_eq!(wire[0].content, None);
        assert!(OpenAiAdapter::from_wire(wire)[0].parts.is_empty());
    }

    #[test]
    fn test_round_trip_sample() {
        let original = sample_conversation();
        let restored = OpenAiAdapter::from_wire(OpenAiAdapter::to_wire(&original, Some("sys")));
        assert_eq!(restored, original);
    }

    proptest! {
        #[test]
        fn prop_round_trip(conversation in conversation_strategy()) {
            let restored = OpenAiAdapter::from_wire(OpenAiAdapter::to_wire(&conversation, None));
            prop_assert_eq!(restored, conversation);
        }
    }

    #[test]
    fn test_from_wire_malformed_arguments() {
        let wire = vec![OpenAiMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![OpenAiToolCall {
                id: "c1".to_string(),
                r#type: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: "decompile".to_string(),
                    arguments: "{not json".to_string(),
                },
            }]),
            tool_call_id: None,
        }];
        let messages = OpenAiAdapter::from_wire(wire);
        assert_eq!(messages[0].tool_calls()[0].arguments, &json!({}));
    }

    #[test]
    fn test_build_request_stream_options() {
        let adapter = OpenAiAdapter::new("key");
        let request = CompletionRequest::new("gpt", vec![Message::user("hi")]);
        let body = serde_json::to_value(adapter.build_request(&request, true)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("tools").is_none());

        let body = serde_json::to_value(adapter.build_request(&request, false)).unwrap();
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_parse_error_codes() {
        let auth = r#"{"error": {"message": "bad key", "code": "invalid_api_key"}}"#;
        assert!(matches!(
            OpenAiAdapter::parse_error(401, auth, None),
            UnfoldError::Api(ApiError::AuthenticationFailed)
        ));

        let rate = r#"{"error": {"message": "slow down", "code": "rate_limit_exceeded"}}"#;
        match OpenAiAdapter::parse_error(429, rate, None) {
            UnfoldError::Api(ApiError::RateLimited(secs)) => assert_eq!(secs, 60),
            other => panic!("Expected RateLimited, got {other:?}"),
        }

        let context = r#"{"error": {"message": "150000 tokens exceeds 128000", "code": "context_length_exceeded"}}"#;
        match OpenAiAdapter::parse_error(400, context, None) {
            UnfoldError::Api(ApiError::ContextTooLong { current, limit }) => {
                assert_eq!((current, limit), (150000, 128000));
            }
            other => panic!("Expected ContextTooLong, got {other:?}"),
        }

        let model = r#"{"error": {"message": "no such model", "code": "model_not_found"}}"#;
        assert!(matches!(
            OpenAiAdapter::parse_error(404, model, None),
            UnfoldError::Api(ApiError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_parse_error_falls_back_on_status() {
        let body = r#"{"error": {"message": "nope", "code": null}}"#;
        assert!(matches!(
            OpenAiAdapter::parse_error(401, body, None),
            UnfoldError::Api(ApiError::AuthenticationFailed)
        ));
        match OpenAiAdapter::parse_error(502, "<html>", None) {
            UnfoldError::Api(ApiError::ServerError { status, .. }) => assert_eq!(status, 502),
            other => panic!("Expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_chunk_parser_text_and_done() {
        let events = parse_all(&[
            r#"data: {"id":"c1","model":"gpt","choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#,
            r#"data: {"id":"c1","model":"gpt","choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            ": keep-alive",
            "data: [DONE]",
        ]);
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert_eq!(
            events[1],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::Text {
                    text: "Hel".to_string()
                },
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::EndTurn),
                usage: None,
            }
        );
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }

    #[test]
    fn test_chunk_parser_usage_only_chunk() {
        let events = parse_all(&[
            r#"data: {"id":"c1","model":"gpt","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7}}"#,
        ]);
        assert_eq!(
            events[1],
            StreamEvent::MessageDelta {
                stop_reason: None,
                usage: Some(Usage::new(12, 7)),
            }
        );
    }

    #[test]
    fn test_streaming_matches_non_streaming() {
        let non_streaming: OpenAiResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Looking.",
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "decompile", "arguments": "{\"function\":\"main\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "get_strings", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 9}
        }))
        .unwrap();
        let choice = non_streaming.choices.into_iter().next().unwrap();
        let expected = Message::assistant_parts(assistant_parts(
            choice.message.content,
            choice.message.tool_calls.unwrap_or_default(),
        ));

        let events = parse_all(&[
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"role":"assistant","content":"Look"}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"content":"ing."}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"decompile","arguments":""}}]}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"get_strings","arguments":"{}"}}]}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"function\":"}}]}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"main\"}"}}]}}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"data: {"id":"chatcmpl-1","model":"gpt","choices":[],"usage":{"prompt_tokens":30,"completion_tokens":9}}"#,
            "data: [DONE]",
        ]);

        let mut assembler = StreamAssembler::new()
            .with_call_id_ordering(OpenAiAdapter::new("k").orders_streamed_calls_by_id());
        for event in events {
            assembler.process_event(event).unwrap();
        }
        let streamed = assembler.finish();

        assert_eq!(streamed.message, expected);
        assert_eq!(streamed.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(streamed.usage, Some(Usage::new(30, 9)));
    }

    #[test]
    fn test_chunk_parser_error_chunk() {
        let events = parse_all(&[r#"data: {"error":{"message":"upstream died","code":"server_error"}}"#]);
        assert!(matches!(&events[0], StreamEvent::Error { message, .. } if message == "upstream died"));
    }
}
