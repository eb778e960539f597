// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! unfold - LLM-driven binary analysis with a provider-agnostic tool-calling core.
//!
//! This crate exposes the runtime used by the `unfold` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `llm`: message model, protocol adapters (Anthropic native and
//!   OpenAI-compatible), stream reassembly and usage accounting
//! - `tools`: tool registry with prefix-tolerant dispatch, file tools and
//!   decompiler tools
//! - `agent`: the turn-scheduling agent loop
//! - `config`, `prompts`, `session`, `report`: the plumbing around the loop

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod report;
pub mod session;
pub mod tools;

pub use error::{Result, UnfoldError};
