// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{ConfigOverrides, OutputFormat};

/// unfold - LLM-driven binary analysis
#[derive(Parser, Debug)]
#[command(name = "unfold")]
#[command(version, about = "LLM-driven binary analysis in your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v for debug logs, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a binary
    Analyze(AnalyzeArgs),

    /// List saved sessions
    Sessions,

    /// Ask a follow-up question in a saved session
    Resume(ResumeArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Binary to analyze
    pub binary: PathBuf,

    /// What you want to learn about the binary
    #[arg(short, long)]
    pub goal: Option<String>,

    /// Analysis mode: explore, ctf, vuln, annotate, explain
    #[arg(short, long, default_value = "explore")]
    pub mode: String,

    /// Model to use (overrides config and per-mode models)
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum agent turns
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Wait for complete responses instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save the session for later follow-ups
    #[arg(long)]
    pub save_session: bool,

    /// Ask follow-up questions after the analysis
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResumeArgs {
    /// Session file, or a name in the sessions directory (`latest` for the newest)
    pub session: String,

    /// Follow-up question
    pub question: String,

    /// Wait for complete responses instead of streaming
    #[arg(long)]
    pub no_stream: bool,
}

/// Report format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ReportFormat {
    /// Rendered to the terminal
    Terminal,
    Markdown,
    Json,
}

impl From<ReportFormat> for OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Terminal => OutputFormat::Terminal,
            ReportFormat::Markdown => OutputFormat::Markdown,
            ReportFormat::Json => OutputFormat::Json,
        }
    }
}

impl AnalyzeArgs {
    /// Flags that take precedence over config files and the environment
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            max_turns: self.max_turns,
            output_format: self.format.map(Into::into),
            output_file: self.output.clone(),
            stream: self.no_stream.then_some(false),
            save_session: self.save_session.then_some(true),
            decompiler_url: None,
        }
    }
}

impl ResumeArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            stream: self.no_stream.then_some(false),
            ..ConfigOverrides::default()
        }
    }
}
