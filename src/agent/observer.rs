// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Output hooks for the agent loop.
//!
//! Frontends implement this trait to render progress. Every hook defaults to
//! doing nothing.

use serde_json::Value;

use super::types::RunOutcome;

pub trait AgentObserver: Send {
    fn on_turn_start(&mut self, _turn: usize, _max_turns: u32) {}

    /// A fragment of assistant text while streaming
    fn on_text_delta(&mut self, _text: &str) {}

    /// Assistant text of a non-streamed response
    fn on_text(&mut self, _text: &str) {}

    fn on_tool_call(&mut self, _name: &str, _input: &Value) {}

    /// The result as it will be sent back to the model
    fn on_tool_result(&mut self, _name: &str, _result: &str) {}

    fn on_finished(&mut self, _outcome: &RunOutcome) {}
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}
