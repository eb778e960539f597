// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for unfold
//!
//! Values are layered, lowest priority first: built-in defaults,
//! `~/.config/unfold/config.toml`, `./.unfold.toml`, environment variables,
//! then command-line overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::UnfoldError;

mod io;
mod migration;
mod validation;

pub use validation::EnvLookup;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// Turn budget per run
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Maximum output tokens per backend call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Tool results longer than this many characters are clipped
    #[serde(default = "default_truncation_limit")]
    pub truncation_limit: usize,

    /// Tool calls whose serialized arguments exceed this are not dispatched
    #[serde(default = "default_max_tool_argument_bytes")]
    pub max_tool_argument_bytes: usize,

    /// Per-mode model overrides
    #[serde(default)]
    pub mode_models: HashMap<String, String>,

    /// Where decompiler projects live. `~` is expanded.
    #[serde(default = "default_project_dir")]
    pub project_dir: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,

    /// Stream responses as they arrive
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Save the session when a run ends
    #[serde(default)]
    pub save_session: bool,

    /// Base URL of the decompiler service
    #[serde(default = "default_decompiler_url")]
    pub decompiler_url: String,

    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_turns: default_max_turns(),
            max_tokens: default_max_tokens(),
            truncation_limit: default_truncation_limit(),
            max_tool_argument_bytes: default_max_tool_argument_bytes(),
            mode_models: HashMap::new(),
            project_dir: default_project_dir(),
            output_format: OutputFormat::default(),
            output_file: None,
            stream: true,
            save_session: false,
            decompiler_url: default_decompiler_url(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Model to use for an analysis mode
    pub fn model_for_mode(&self, mode: &str) -> &str {
        self.mode_models
            .get(mode)
            .map(String::as_str)
            .unwrap_or(&self.model)
    }

    /// `project_dir` with a leading `~` expanded
    pub fn resolved_project_dir(&self) -> PathBuf {
        expand_home(&self.project_dir)
    }

    /// Apply command-line overrides. Unset fields leave the value alone.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref model) = overrides.model {
            self.model = model.clone();
        }
        if let Some(max_turns) = overrides.max_turns {
            self.max_turns = max_turns;
        }
        if let Some(format) = overrides.output_format {
            self.output_format = format;
        }
        if let Some(ref file) = overrides.output_file {
            self.output_file = Some(file.clone());
        }
        if let Some(stream) = overrides.stream {
            self.stream = stream;
        }
        if let Some(save) = overrides.save_session {
            self.save_session = save;
        }
        if let Some(ref url) = overrides.decompiler_url {
            self.decompiler_url = url.clone();
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub output_format: Option<OutputFormat>,
    pub output_file: Option<PathBuf>,
    pub stream: Option<bool>,
    pub save_session: Option<bool>,
    pub decompiler_url: Option<String>,
}

/// How the final report is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Terminal,
    Markdown,
    Json,
}

impl FromStr for OutputFormat {
    type Err = UnfoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terminal" => Ok(OutputFormat::Terminal),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => Err(UnfoldError::Config(format!(
                "Unknown output format '{other}' (expected terminal, markdown or json)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Terminal => "terminal",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        })
    }
}

/// Wire protocol spoken by the LLM backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Anthropic messages API
    #[default]
    Native,
    /// OpenAI-compatible chat completions
    OpenAi,
}

/// LLM backend selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL for API (for proxies and custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl BackendConfig {
    /// Environment variable consulted for the API key
    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.kind) {
            (Some(name), _) => name,
            (None, BackendKind::Native) => "ANTHROPIC_API_KEY",
            (None, BackendKind::OpenAi) => "OPENAI_API_KEY",
        }
    }
}

// Default value functions
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_turns() -> u32 {
    50
}

fn default_max_tokens() -> u32 {
    16384
}

fn default_truncation_limit() -> usize {
    30_000
}

fn default_max_tool_argument_bytes() -> usize {
    100_000
}

fn default_project_dir() -> String {
    "~/.unfold/projects".to_string()
}

fn default_decompiler_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_true() -> bool {
    true
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}
