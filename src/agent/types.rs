// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Core types for the agent loop

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::llm::message::Conversation;
use crate::llm::usage::UsageSnapshot;

/// Result text when the turn budget runs out
pub const INCOMPLETE_RESULT: &str = "Analysis incomplete: reached maximum number of turns.";

/// Result text when the user interrupts a run
pub const INTERRUPTED_RESULT: &str = "Analysis interrupted.";

/// Marker appended to clipped tool results
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Characters of each tool result kept in the turn log
pub const RESULT_PREVIEW_CHARS: usize = 500;

/// Run parameters for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to request
    pub model: String,
    /// System instructions sent with every request
    pub system_prompt: String,
    /// Turn budget per `run`/`ask`
    pub max_turns: u32,
    /// Maximum output tokens per backend call
    pub max_tokens: u32,
    /// Tool results longer than this many characters are clipped
    pub truncation_limit: usize,
    /// Tool calls with larger serialized arguments are refused
    pub max_tool_argument_bytes: usize,
    /// Use the streaming protocol
    pub stream: bool,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_turns: 50,
            max_tokens: 16384,
            truncation_limit: 30_000,
            max_tool_argument_bytes: 100_000,
            stream: true,
        }
    }

    /// Limits taken from the loaded configuration
    pub fn from_config(
        config: &Config,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_turns: config.max_turns,
            max_tokens: config.max_tokens,
            truncation_limit: config.truncation_limit,
            max_tool_argument_bytes: config.max_tool_argument_bytes,
            stream: config.stream,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_truncation_limit(mut self, limit: usize) -> Self {
        self.truncation_limit = limit;
        self
    }

    pub fn with_max_tool_argument_bytes(mut self, limit: usize) -> Self {
        self.max_tool_argument_bytes = limit;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    /// Awaiting a backend response
    Thinking,
    /// Interpreting a completed response
    Responding,
    ExecutingTools,
    Done,
    TimedOut,
    Interrupted,
    /// A backend error ended the run
    Failed,
}

/// How a `run` or `ask` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model finished; carries its final text
    Completed(String),
    /// The turn budget ran out
    TimedOut,
    /// The user interrupted while the backend was thinking
    Interrupted,
}

impl RunOutcome {
    /// Final text, or the fixed result for the other outcomes
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::Completed(text) => text,
            RunOutcome::TimedOut => INCOMPLETE_RESULT,
            RunOutcome::Interrupted => INTERRUPTED_RESULT,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// One tool invocation as recorded in the turn log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Value,
    /// Start of the (already truncated) result
    pub result: String,
}

/// One turn as recorded for reports and sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based, continuous across follow-up questions
    pub turn: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Everything needed to continue a conversation later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub messages: Conversation,
    pub turn_log: Vec<TurnRecord>,
    pub usage: UsageSnapshot,
}

/// Clip `text` to `limit` characters, appending [`TRUNCATION_MARKER`] when clipped
pub fn truncate_result(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut clipped = text[..cut].to_string();
            clipped.push_str(TRUNCATION_MARKER);
            clipped
        }
        None => text,
    }
}

/// First [`RESULT_PREVIEW_CHARS`] characters of a tool result
pub fn preview(text: &str) -> String {
    text.chars().take(RESULT_PREVIEW_CHARS).collect()
}

/// Cancels the wait on the backend.
///
/// Cloned handles share one flag. The run that observes the interrupt clears it.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request an interrupt
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Clear a pending interrupt
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Clear the flag, returning whether it was set
    pub(crate) fn take(&self) -> bool {
        self.tx.send_replace(false)
    }

    /// Resolves once an interrupt is requested
    pub(crate) async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
