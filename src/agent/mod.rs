// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The agent loop
//!
//! [`AgentLoop`] alternates between asking the model for the next step and
//! running the tools it requests, until the model answers without tool
//! calls, the turn budget runs out, or the user interrupts.

pub mod observer;
pub mod runner;
pub mod types;

pub use observer::{AgentObserver, NoopObserver};
pub use runner::AgentLoop;
pub use types::{
    AgentConfig, AgentSnapshot, AgentState, InterruptHandle, RunOutcome, ToolCallRecord,
    TurnRecord, INCOMPLETE_RESULT, INTERRUPTED_RESULT, RESULT_PREVIEW_CHARS, TRUNCATION_MARKER,
};
