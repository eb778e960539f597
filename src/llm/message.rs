// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! The backend-neutral conversation model. Every adapter translates to and
//! from these types; every part serializes with an explicit `type` tag so a
//! saved conversation can be rebuilt exactly.

use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Results of tool calls requested by the previous assistant message
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// A typed unit of message content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },
    /// The model asks for a tool to be invoked
    ToolCallRequest {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// Output of a tool invocation, correlated by `call_id`
    ToolCallResult { call_id: String, content: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        ContentPart::ToolCallRequest {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentPart::ToolCallResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ContentPart::ToolCallRequest { .. })
    }
}

/// Borrowed view of a tool call request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCall<'a> {
    pub call_id: &'a str,
    pub tool_name: &'a str,
    pub arguments: &'a serde_json::Value,
}

/// One conversational turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::text(content)],
        }
    }

    /// Create an assistant message with plain text
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::assistant_parts(vec![ContentPart::text(content)])
    }

    /// Create an assistant message from parts
    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// Create a tool-result message. Only `ToolCallResult` parts belong here.
    pub fn tool_results(parts: Vec<ContentPart>) -> Self {
        debug_assert!(parts
            .iter()
            .all(|p| matches!(p, ContentPart::ToolCallResult { .. })));
        Self {
            role: Role::ToolResult,
            parts,
        }
    }

    /// Concatenation of all text parts, in order
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool call requests in the order they appear
    pub fn tool_calls(&self) -> Vec<ToolCall<'_>> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolCallRequest {
                    call_id,
                    tool_name,
                    arguments,
                } => Some(ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                }),
                _ => None,
            })
            .collect()
    }

    /// Check if the message requests any tool calls
    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(ContentPart::is_tool_call)
    }
}

/// The conversation owned by one agent session.
///
/// Append-only: messages are pushed, never edited or removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a conversation from previously saved messages
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
