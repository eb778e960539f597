// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Protocol adapter trait and related types
//!
//! Defines the abstraction layer over the backend wire protocols. An adapter
//! takes the canonical conversation, speaks its backend's dialect and hands
//! back one canonical assistant [`Message`].

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::Message;

/// Boxed stream of canonical stream events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for backend protocol adapters
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Get the backend name (e.g., "anthropic", "openai")
    fn name(&self) -> &str;

    /// One complete request/response cycle
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// One streamed cycle. Events arrive in order and must be applied in order.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream>;

    /// Whether streamed tool calls are re-sorted by `call_id` once assembled.
    /// Protocols that stream tool calls as index-keyed units turn this on;
    /// everyone else keeps the emitted order.
    fn orders_streamed_calls_by_id(&self) -> bool {
        false
    }
}

/// Request for completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// System instructions
    pub system: Option<String>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Temperature for sampling (backend default when unset)
    pub temperature: Option<f32>,

    /// Tool catalogue
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 16384,
            temperature: None,
            tools: Vec::new(),
        }
    }

    /// Set the system instructions
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Response from completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Response ID
    pub id: String,

    /// Model used
    pub model: String,

    /// The assistant message
    pub message: Message,

    /// Why the model stopped
    pub stop_reason: Option<StopReason>,

    /// Token usage, when the backend reported it
    pub usage: Option<Usage>,
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response
    EndTurn,
    /// Hit max tokens limit
    MaxTokens,
    /// Wants to use a tool
    ToolUse,
    /// Hit a stop sequence
    StopSequence,
}

impl StopReason {
    /// Map a native `stop_reason` string
    pub fn from_native(reason: &str) -> Self {
        match reason {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "tool_use" => StopReason::ToolUse,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }

    /// Map an OpenAI-style `finish_reason` string
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => StopReason::EndTurn,
            "length" => StopReason::MaxTokens,
            "tool_calls" | "function_call" => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        }
    }

    /// Whether the backend considers the response finished
    pub fn is_completion(self) -> bool {
        matches!(self, StopReason::EndTurn | StopReason::StopSequence)
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Fold in a partial report. Streams report input and output counts in
    /// separate events; non-zero fields win.
    pub fn merge(&mut self, other: Usage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }
}

/// Stream events, normalized across backends
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Message started
    MessageStart {
        id: String,
        model: String,
        usage: Option<Usage>,
    },

    /// A content unit opened
    ContentBlockStart { index: usize, block: BlockStart },

    /// Fragment for an open content unit
    ContentBlockDelta { index: usize, delta: ContentDelta },

    /// Content unit closed
    ContentBlockStop { index: usize },

    /// Message-level update
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },

    /// Message complete
    MessageStop,

    /// Keep-alive
    Ping,

    /// Error reported inside the stream
    Error { error_type: String, message: String },
}

/// Header of a content unit
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    Text { text: String },
    ToolCall { call_id: String, tool_name: String },
}

/// Fragment of a content unit
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDelta {
    Text { text: String },
    Arguments { partial_json: String },
}

/// Tool definition for the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Parameter schema (JSON Schema)
    pub input_schema: ToolInputSchema,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ToolInputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Input schema for a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Property definitions
    pub properties: serde_json::Value,

    /// Required properties
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    /// Schema for a tool that takes no arguments
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: serde_json::json!({}),
            required: Vec::new(),
        }
    }

    /// Render as a JSON Schema object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.schema_type,
            "properties": self.properties,
            "required": self.required,
        })
    }
}
