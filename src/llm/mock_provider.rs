// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock protocol adapter for testing
//!
//! Plays back a script of responses without touching the network, in both
//! complete and streamed form, and records every request it receives.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, Result, UnfoldError};
use crate::llm::message::{ContentPart, Message};
use crate::llm::provider::{
    BlockStart, CompletionRequest, CompletionResponse, ContentDelta, EventStream,
    ProtocolAdapter, StopReason, StreamEvent, Usage,
};

/// A scripted mock backend
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Configured responses
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Wait before answering each call
    delay: Option<Duration>,
    /// Wait between streamed events
    event_delay: Option<Duration>,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to return
    pub text: String,
    /// Tool calls to return
    pub tool_calls: Vec<MockToolCall>,
    /// Stop reason
    pub stop_reason: Option<StopReason>,
    /// Token usage; `None` simulates a backend that reports nothing
    pub usage: Option<Usage>,
    /// Fail the call with a network error carrying this message
    pub failure: Option<String>,
}

/// A mock tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    /// Tool call ID; an empty id is minted per call
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input (JSON)
    pub input: serde_json::Value,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            stop_reason: Some(StopReason::EndTurn),
            usage: Some(Usage::new(10, 20)),
            failure: None,
        }
    }
}

impl MockResponse {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A single tool call with no commentary
    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::tool_calls(vec![(name.into(), input)])
    }

    /// Several tool calls in one assistant message
    pub fn tool_calls(calls: Vec<(String, serde_json::Value)>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls
                .into_iter()
                .map(|(name, input)| MockToolCall {
                    id: String::new(),
                    name,
                    input,
                })
                .collect(),
            stop_reason: Some(StopReason::ToolUse),
            ..Default::default()
        }
    }

    /// A fatal transport failure
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Add interim commentary
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_stop_reason(mut self, stop_reason: Option<StopReason>) -> Self {
        self.stop_reason = stop_reason;
        self
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    /// Assistant message parts, minting ids for calls that have none
    fn parts(&self, call_number: usize) -> Vec<ContentPart> {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(ContentPart::text(self.text.clone()));
        }
        for (i, call) in self.tool_calls.iter().enumerate() {
            let id = if call.id.is_empty() {
                format!("call_{call_number}_{i}")
            } else {
                call.id.clone()
            };
            parts.push(ContentPart::tool_call(id, call.name.clone(), call.input.clone()));
        }
        parts
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
            delay: None,
            event_delay: None,
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Set the text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Queue multiple text responses (returned in order)
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        self.with_script(texts.into_iter().map(MockResponse::text).collect())
    }

    /// Set a tool call response
    pub fn with_tool_call(self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.with_script(vec![MockResponse::tool_call(name, input)])
    }

    /// Replace the script. Calls past its end repeat the last entry.
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        let mut responses = lock(&self.responses);
        *responses = script;
        drop(responses);
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pause between streamed events. The first event is sent at once.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Get the number of times the backend was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        lock(&self.recorded_requests).clear();
    }

    /// Record the request, wait out any delay and pick the next response
    async fn begin(&self, request: &CompletionRequest) -> Result<(usize, MockResponse)> {
        lock(&self.recorded_requests).push(request.clone());
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let responses = lock(&self.responses);
            match responses.len() {
                0 => MockResponse::default(),
                len => responses[count.min(len - 1)].clone(),
            }
        };

        if let Some(message) = &response.failure {
            return Err(UnfoldError::Api(ApiError::Network(message.clone())));
        }
        Ok((count, response))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[async_trait]
impl ProtocolAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let (count, response) = self.begin(&request).await?;

        Ok(CompletionResponse {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model,
            message: Message::assistant_parts(response.parts(count)),
            stop_reason: response.stop_reason,
            usage: response.usage,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let (count, response) = self.begin(&request).await?;

        let mut events = vec![StreamEvent::MessageStart {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model.clone(),
            usage: response.usage.map(|u| Usage::new(u.input_tokens, 0)),
        }];

        for (index, part) in response.parts(count).into_iter().enumerate() {
            match part {
                ContentPart::Text { text } => {
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        block: BlockStart::Text {
                            text: String::new(),
                        },
                    });
                    // Stream the text in chunks
                    for chunk in text.chars().collect::<Vec<_>>().chunks(10) {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: ContentDelta::Text {
                                text: chunk.iter().collect(),
                            },
                        });
                    }
                }
                ContentPart::ToolCallRequest {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        block: BlockStart::ToolCall { call_id, tool_name },
                    });
                    let json = arguments.to_string();
                    let split = json.char_indices().nth(json.chars().count() / 2);
                    let (head, tail) = json.split_at(split.map_or(0, |(i, _)| i));
                    for fragment in [head, tail].into_iter().filter(|f| !f.is_empty()) {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: ContentDelta::Arguments {
                                partial_json: fragment.to_string(),
                            },
                        });
                    }
                }
                ContentPart::ToolCallResult { .. } => continue,
            }
            events.push(StreamEvent::ContentBlockStop { index });
        }

        events.push(StreamEvent::MessageDelta {
            stop_reason: response.stop_reason,
            usage: response.usage.map(|u| Usage::new(0, u.output_tokens)),
        });
        events.push(StreamEvent::MessageStop);

        let Some(pause) = self.event_delay else {
            return Ok(Box::pin(stream::iter(events.into_iter().map(Ok))));
        };
        let paced = stream::iter(events.into_iter().enumerate()).then(move |(i, event)| {
            async move {
                if i > 0 {
                    tokio::time::sleep(pause).await;
                }
                Ok::<_, UnfoldError>(event)
            }
        });
        Ok(Box::pin(paced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::streaming::collect_stream;
    use futures::StreamExt;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new("mock-model", vec![Message::user("Test")])
    }

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockProvider::new();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_mock_provider_with_name() {
        let provider = MockProvider::with_name("test-provider");
        assert_eq!(provider.name(), "test-provider");
    }

    #[tokio::test]
    async fn test_mock_provider_complete() {
        let provider = MockProvider::new().with_response("Test response");
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.model, "mock-model");
        assert_eq!(response.message.text(), "Test response");
        assert_eq!(response.usage, Some(Usage::new(10, 20)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_records_requests() {
        let provider = MockProvider::new();
        provider.complete(request()).await.unwrap();
        let recorded = provider.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].model, "mock-model");
        assert_eq!(provider.last_request().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_reset() {
        let provider = MockProvider::new();
        provider.complete(request()).await.unwrap();
        provider.reset();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_mock_provider_multiple_responses() {
        let provider = MockProvider::new().with_responses(vec![
            "First".to_string(),
            "Second".to_string(),
        ]);
        let r1 = provider.complete(request()).await.unwrap();
        let r2 = provider.complete(request()).await.unwrap();
        let r3 = provider.complete(request()).await.unwrap(); // Repeats last
        assert_eq!(r1.message.text(), "First");
        assert_eq!(r2.message.text(), "Second");
        assert_eq!(r3.message.text(), "Second");
    }

    #[tokio::test]
    async fn test_mock_provider_mints_call_ids_per_call() {
        let provider =
            MockProvider::new().with_tool_call("decompile", json!({ "function": "main" }));
        let r1 = provider.complete(request()).await.unwrap();
        let r2 = provider.complete(request()).await.unwrap();
        assert_eq!(r1.stop_reason, Some(StopReason::ToolUse));
        let id1 = r1.message.tool_calls()[0].call_id.to_string();
        let id2 = r2.message.tool_calls()[0].call_id.to_string();
        assert_ne!(id1, id2);
        assert_eq!(r1.message.tool_calls()[0].arguments["function"], "main");
    }

    #[tokio::test]
    async fn test_mock_provider_failure() {
        let provider = MockProvider::new().with_script(vec![MockResponse::failure("down")]);
        match provider.complete(request()).await {
            Err(UnfoldError::Api(ApiError::Network(msg))) => assert_eq!(msg, "down"),
            other => panic!("Expected network error, got {:?}", other.map(|r| r.id)),
        }
    }

    #[tokio::test]
    async fn test_mock_provider_stream_matches_complete() {
        let script = vec![MockResponse::tool_calls(vec![
            ("decompile".to_string(), json!({ "function": "main" })),
            ("get_strings".to_string(), json!({})),
        ])
        .with_text("Looking at the entry point and its strings.")];
        let provider = MockProvider::new().with_script(script);

        let complete = provider.complete(request()).await.unwrap();
        provider.reset();
        let stream = provider.complete_stream(request()).await.unwrap();
        let streamed = collect_stream(stream, |_| {}).await.unwrap();

        assert_eq!(streamed.message, complete.message);
        assert_eq!(streamed.usage, complete.usage);
        assert_eq!(streamed.stop_reason, complete.stop_reason);
    }

    #[tokio::test]
    async fn test_mock_provider_complete_stream_events() {
        let provider = MockProvider::new().with_response("Streaming test");
        let mut stream = provider.complete_stream(request()).await.unwrap();
        let mut events = vec![];
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events.last().unwrap(), StreamEvent::MessageStop));
    }

    #[tokio::test]
    async fn test_mock_provider_delay() {
        let provider = MockProvider::new().with_delay(Duration::from_millis(50));
        let started = std::time::Instant::now();
        provider.complete(request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_provider_event_delay_paces_stream() {
        let pause = Duration::from_millis(20);
        let provider = MockProvider::new()
            .with_response("Streaming test")
            .with_event_delay(pause);
        let started = std::time::Instant::now();
        let mut stream = provider.complete_stream(request()).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::MessageStart { .. }));

        let mut rest = vec![];
        while let Some(event) = stream.next().await {
            rest.push(event.unwrap());
        }
        // start, two text chunks, stop, delta, message stop
        assert_eq!(rest.len(), 6);
        assert!(started.elapsed() >= pause * 6);
        assert!(matches!(rest.last().unwrap(), StreamEvent::MessageStop));
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider = MockProvider::new().with_response("Cloneable");
        let cloned = provider.clone();
        assert!(Arc::ptr_eq(&provider.responses, &cloned.responses));
    }
}
