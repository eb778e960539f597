// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session persistence
//!
//! A session file holds everything needed to continue an analysis later:
//! the run parameters, the full conversation (every content part tagged),
//! the turn log and the usage totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agent::{AgentConfig, AgentSnapshot, TurnRecord};
use crate::config::Config;
use crate::error::{Result, UnfoldError};
use crate::llm::message::Conversation;
use crate::llm::usage::UsageSnapshot;

/// Format version written to new session files
pub const SESSION_VERSION: &str = "0.2.0";

/// Name of the pointer to the most recent session
pub const LATEST_FILE: &str = "latest.json";

/// Maximum number of sessions returned by [`list`]
pub const LIST_LIMIT: usize = 20;

/// On-disk session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub version: String,
    pub binary_path: PathBuf,
    pub mode: String,
    pub model: String,
    pub max_turns: u32,
    pub stream: bool,
    pub messages: Conversation,
    #[serde(default, alias = "turn_data")]
    pub turn_log: Vec<TurnRecord>,
    #[serde(default)]
    pub usage: UsageSnapshot,
    pub saved_at: DateTime<Utc>,
}

/// One row of the session listing
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub file: String,
    pub binary: String,
    pub mode: String,
    pub model: String,
    pub turns: usize,
    pub saved_at: DateTime<Utc>,
}

impl SessionFile {
    /// Capture a finished (or paused) agent
    pub fn new(
        binary_path: impl Into<PathBuf>,
        mode: impl Into<String>,
        config: &AgentConfig,
        snapshot: AgentSnapshot,
    ) -> Self {
        Self {
            version: SESSION_VERSION.to_string(),
            binary_path: binary_path.into(),
            mode: mode.into(),
            model: config.model.clone(),
            max_turns: config.max_turns,
            stream: config.stream,
            messages: snapshot.messages,
            turn_log: snapshot.turn_log,
            usage: snapshot.usage,
            saved_at: Utc::now(),
        }
    }

    /// State for [`crate::agent::AgentLoop::resume`]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            messages: self.messages.clone(),
            turn_log: self.turn_log.clone(),
            usage: self.usage,
        }
    }

    /// Run parameters as saved, with limits not stored in the file taken from `config`
    pub fn agent_config(&self, config: &Config, system_prompt: impl Into<String>) -> AgentConfig {
        AgentConfig::from_config(config, self.model.clone(), system_prompt)
            .with_max_turns(self.max_turns)
            .with_stream(self.stream)
    }

    /// Save into the default sessions directory
    pub fn save(&self) -> Result<PathBuf> {
        self.save_in(&Config::sessions_dir())
    }

    /// Write `<stem>_<timestamp>.json` into `dir` and point `latest.json` at it
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let stem = self
            .binary_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let filename = format!("{stem}_{}.json", self.saved_at.format("%Y%m%d_%H%M%S"));
        let path = dir.join(filename);

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        tracing::info!(path = %path.display(), "saved session");

        if let Err(e) = update_latest(dir, &path) {
            tracing::debug!(error = %e, "could not update latest session link");
        }
        Ok(path)
    }

    /// Read and validate a session file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(UnfoldError::Session(format!(
                "Session file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            UnfoldError::Session(format!("Invalid session file: {}: {e}", path.display()))
        })
    }
}

fn update_latest(dir: &Path, target: &Path) -> std::io::Result<()> {
    let latest = dir.join(LATEST_FILE);
    if latest.symlink_metadata().is_ok() {
        std::fs::remove_file(&latest)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, &latest)
    }
    #[cfg(not(unix))]
    {
        std::fs::copy(target, &latest).map(|_| ())
    }
}

/// Resolve a session argument: an existing path, or a file name in `dir`
/// (with or without `.json`). `latest` names the most recent session.
pub fn resolve(dir: &Path, name: &str) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.exists() {
        return direct;
    }
    let in_dir = dir.join(name);
    if in_dir.exists() || name.ends_with(".json") {
        return in_dir;
    }
    dir.join(format!("{name}.json"))
}

/// Saved sessions in `dir`, newest first
pub fn list(dir: &Path) -> Result<Vec<SessionSummary>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut summaries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == LATEST_FILE || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match SessionFile::load(&path) {
            Ok(session) => summaries.push(SessionSummary {
                file: name.to_string(),
                binary: session
                    .binary_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "?".to_string()),
                mode: session.mode,
                model: session.model,
                turns: session.turn_log.len(),
                saved_at: session.saved_at,
            }),
            Err(e) => tracing::warn!(file = %name, error = %e, "skipping unreadable session"),
        }
    }

    summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| b.file.cmp(&a.file)));
    summaries.truncate(LIST_LIMIT);
    Ok(summaries)
}
