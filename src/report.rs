// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Analysis reports rendered as JSON or Markdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

use crate::agent::TurnRecord;
use crate::error::Result;
use crate::llm::usage::{group_thousands, UsageSnapshot};

pub const REPORT_VERSION: &str = "0.2.0";

/// Characters of each tool result shown in the Markdown log
const MARKDOWN_RESULT_CHARS: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryInfo {
    pub name: String,
    pub path: String,
    /// Empty when the file could not be read
    pub sha256: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub mode: String,
    pub model: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: String,
    pub binary: BinaryInfo,
    pub analysis: AnalysisInfo,
    pub summary: String,
    pub turns: Vec<TurnRecord>,
    pub usage: UsageSnapshot,
}

/// Inputs for [`Report::build`]
pub struct ReportInput<'a> {
    pub binary_path: &'a Path,
    pub mode: &'a str,
    pub model: &'a str,
    pub goal: Option<&'a str>,
    pub started_at: DateTime<Utc>,
    pub summary: &'a str,
    pub turns: &'a [TurnRecord],
    pub usage: UsageSnapshot,
}

impl Report {
    /// Build a report for a finished run; completion time is now
    pub fn build(input: ReportInput<'_>) -> Self {
        let name = input
            .binary_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sha256 = match file_sha256(input.binary_path) {
            Ok(digest) => digest,
            Err(e) => {
                tracing::debug!(error = %e, "could not hash binary for report");
                String::new()
            }
        };

        Self {
            version: REPORT_VERSION.to_string(),
            binary: BinaryInfo {
                name,
                path: input.binary_path.display().to_string(),
                sha256,
                architecture: architecture_from_turns(input.turns),
            },
            analysis: AnalysisInfo {
                mode: input.mode.to_string(),
                model: input.model.to_string(),
                goal: input.goal.unwrap_or_default().to_string(),
                started_at: input.started_at,
                completed_at: Utc::now(),
            },
            summary: input.summary.to_string(),
            turns: input.turns.to_vec(),
            usage: input.usage,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_markdown(&mut out);
        out
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# unfold Analysis Report\n")?;
        writeln!(out, "**Binary:** {}  ", self.binary.name)?;
        writeln!(out, "**Path:** `{}`  ", self.binary.path)?;
        if !self.binary.sha256.is_empty() {
            writeln!(out, "**SHA256:** `{}`  ", self.binary.sha256)?;
        }
        if !self.binary.architecture.is_empty() {
            writeln!(out, "**Architecture:** {}  ", self.binary.architecture)?;
        }
        writeln!(out)?;

        writeln!(out, "## Analysis\n")?;
        writeln!(out, "- **Mode:** {}", self.analysis.mode)?;
        writeln!(out, "- **Model:** {}", self.analysis.model)?;
        if !self.analysis.goal.is_empty() {
            writeln!(out, "- **Goal:** {}", self.analysis.goal)?;
        }
        writeln!(out, "- **Completed:** {}", self.analysis.completed_at.to_rfc3339())?;
        writeln!(out)?;

        writeln!(out, "## Summary\n")?;
        writeln!(out, "{}\n", self.summary)?;

        if !self.turns.is_empty() {
            writeln!(out, "## Analysis Log\n")?;
            for turn in &self.turns {
                writeln!(out, "### Turn {}\n", turn.turn)?;
                if !turn.text.is_empty() {
                    writeln!(out, "{}\n", turn.text)?;
                }
                for call in &turn.tool_calls {
                    writeln!(out, "**Tool:** `{}`", call.name)?;
                    if call.input.as_object().is_some_and(|o| !o.is_empty()) {
                        let input = serde_json::to_string_pretty(&call.input)
                            .unwrap_or_else(|_| call.input.to_string());
                        writeln!(out, "```json\n{input}\n```")?;
                    }
                    if !call.result.is_empty() {
                        let preview: String =
                            call.result.chars().take(MARKDOWN_RESULT_CHARS).collect();
                        writeln!(out, "<details><summary>Result</summary>\n")?;
                        writeln!(out, "```\n{preview}\n```\n")?;
                        writeln!(out, "</details>\n")?;
                    }
                }
                writeln!(out)?;
            }
        }

        writeln!(out, "## Token Usage\n")?;
        writeln!(
            out,
            "- **Input tokens:** {}",
            group_thousands(self.usage.input_tokens)
        )?;
        writeln!(
            out,
            "- **Output tokens:** {}",
            group_thousands(self.usage.output_tokens)
        )?;
        writeln!(
            out,
            "- **Total tokens:** {}",
            group_thousands(self.usage.total_tokens)
        )?;
        writeln!(out, "- **API calls:** {}", self.usage.api_calls)?;
        if let Some(cost) = self.usage.estimated_cost_usd.filter(|c| *c > 0.0) {
            writeln!(out, "- **Estimated cost:** ${cost:.4}")?;
        }
        writeln!(out)?;

        writeln!(out, "---\n")?;
        writeln!(out, "*Generated by unfold v{}*", self.version)
    }
}

/// Hex SHA-256 of a file's contents
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// The `language` reported by the last `analyze_binary` call, if any
fn architecture_from_turns(turns: &[TurnRecord]) -> String {
    turns
        .iter()
        .flat_map(|t| &t.tool_calls)
        .filter(|c| c.name == "analyze_binary")
        .filter_map(|c| serde_json::from_str::<serde_json::Value>(&c.result).ok())
        .filter_map(|v| v.get("language").and_then(|l| l.as_str()).map(str::to_string))
        .last()
        .unwrap_or_default()
}
