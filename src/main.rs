// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! unfold - LLM-driven binary analysis
//!
//! Entry point for the unfold CLI application.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use unfold::agent::{AgentConfig, AgentLoop, AgentObserver, InterruptHandle, RunOutcome};
use unfold::cli::{AnalyzeArgs, Cli, Commands, ResumeArgs, TerminalObserver};
use unfold::config::{Config, OutputFormat};
use unfold::llm::AdapterFactory;
use unfold::prompts::{initial_user_message, AnalysisMode};
use unfold::report::{Report, ReportInput};
use unfold::session::{self, SessionFile};
use unfold::tools::decompiler::{DecompilerHandle, HttpDecompilerBackend};
use unfold::tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());

    // `-v` turns on crate diagnostics; explicit RUST_LOG directives still win
    if cli.verbose > 0 && std::env::var_os("RUST_LOG").is_none() {
        let directive = if cli.verbose > 1 {
            "unfold=trace"
        } else {
            "unfold=debug"
        };
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::Sessions => run_sessions(),
        Commands::Resume(args) => run_resume(args).await,
    }
}

async fn run_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.overrides())?;
    config.validate()?;

    let mode: AnalysisMode = args.mode.parse()?;
    if !args.binary.exists() {
        bail!("Binary not found: {}", args.binary.display());
    }
    let binary = args
        .binary
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", args.binary.display()))?;
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.model_for_mode(mode.as_str()).to_string());

    let decompiler = decompiler_for(&config);
    let tools = Arc::new(ToolRegistry::for_binary(&binary, decompiler.clone())?);
    let adapter = AdapterFactory::from_config(&config)?;
    let agent_config = AgentConfig::from_config(&config, model.clone(), mode.system_prompt());

    let report_to_stdout = config.output_file.is_none() && config.output_format != OutputFormat::Terminal;
    let mut agent = AgentLoop::new(adapter, tools, agent_config)
        .with_observer(observer(report_to_stdout))
        .with_interrupt(interrupt_on_ctrl_c());

    eprintln!("unfold v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Loading {} ({mode} mode, {model})", display_name(&binary));

    let started_at = Utc::now();
    let goal = initial_user_message(&display_name(&binary), args.goal.as_deref());
    let outcome = agent.run(goal).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            shutdown(&decompiler).await;
            return Err(e.into());
        }
    };

    let report = Report::build(ReportInput {
        binary_path: &binary,
        mode: mode.as_str(),
        model: &model,
        goal: args.goal.as_deref(),
        started_at,
        summary: outcome.text(),
        turns: agent.turn_log(),
        usage: agent.usage_snapshot(),
    });
    emit_report(&config, &report)?;

    if config.save_session {
        save_session(&binary, mode, &agent)?;
    }

    if args.interactive {
        repl(&mut agent).await?;
        if config.save_session {
            save_session(&binary, mode, &agent)?;
        }
    }

    eprintln!("\n{}", agent.ledger().summary());
    shutdown(&decompiler).await;
    Ok(())
}

fn run_sessions() -> anyhow::Result<()> {
    let sessions = session::list(&Config::sessions_dir())?;
    if sessions.is_empty() {
        println!("No saved sessions found.");
        return Ok(());
    }

    println!(
        "{:<40} {:<20} {:<10} {:<30} {:>5}  Saved At",
        "File", "Binary", "Mode", "Model", "Turns"
    );
    for s in sessions {
        println!(
            "{:<40} {:<20} {:<10} {:<30} {:>5}  {}",
            s.file,
            s.binary,
            s.mode,
            s.model,
            s.turns,
            s.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn run_resume(args: ResumeArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.overrides())?;
    config.validate()?;

    let path = session::resolve(&Config::sessions_dir(), &args.session);
    let saved = SessionFile::load(&path)?;
    let mode: AnalysisMode = saved.mode.parse()?;

    let mut agent_config = saved.agent_config(&config, mode.system_prompt());
    if args.no_stream {
        agent_config = agent_config.with_stream(false);
    }

    let decompiler = decompiler_for(&config);
    let tools = Arc::new(ToolRegistry::for_binary(&saved.binary_path, decompiler.clone())?);
    let adapter = AdapterFactory::from_config(&config)?;
    let mut agent = AgentLoop::resume(adapter, tools, agent_config, saved.snapshot())
        .with_observer(observer(false))
        .with_interrupt(interrupt_on_ctrl_c());

    eprintln!("Resuming session from {}", path.display());
    let result = agent.ask(args.question).await;
    shutdown(&decompiler).await;
    result?;

    save_session(&saved.binary_path, mode, &agent)?;
    eprintln!("\n{}", agent.ledger().summary());
    Ok(())
}

fn decompiler_for(config: &Config) -> Arc<DecompilerHandle> {
    let backend = HttpDecompilerBackend::new(config.decompiler_url.clone())
        .with_project_dir(config.resolved_project_dir());
    Arc::new(DecompilerHandle::new(Arc::new(backend)))
}

async fn shutdown(decompiler: &DecompilerHandle) {
    if let Err(e) = decompiler.shutdown().await {
        tracing::warn!(error = %e, "decompiler shutdown failed");
    }
}

fn observer(quiet_stdout: bool) -> Box<dyn AgentObserver> {
    if quiet_stdout {
        Box::new(TerminalObserver::stderr())
    } else {
        Box::new(TerminalObserver::stdout())
    }
}

/// Every Ctrl-C interrupts the turn in progress
fn interrupt_on_ctrl_c() -> InterruptHandle {
    let handle = InterruptHandle::new();
    let signal = handle.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("ctrl-c received");
            signal.interrupt();
        }
    });
    handle
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write the report to the configured file, or print it when a non-terminal format is chosen
fn emit_report(config: &Config, report: &Report) -> anyhow::Result<()> {
    match &config.output_file {
        Some(path) => {
            let format = match config.output_format {
                OutputFormat::Terminal => format_for_extension(path),
                other => other,
            };
            let content = match format {
                OutputFormat::Json => report.to_json()?,
                _ => report.to_markdown(),
            };
            std::fs::write(path, content)
                .with_context(|| format!("Cannot write report to {}", path.display()))?;
            eprintln!("Report saved to {}", path.display());
        }
        None => match config.output_format {
            OutputFormat::Terminal => {}
            OutputFormat::Markdown => println!("{}", report.to_markdown()),
            OutputFormat::Json => println!("{}", report.to_json()?),
        },
    }
    Ok(())
}

fn format_for_extension(path: &Path) -> OutputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
        _ => OutputFormat::Markdown,
    }
}

fn save_session(binary: &Path, mode: AnalysisMode, agent: &AgentLoop) -> anyhow::Result<PathBuf> {
    let file = SessionFile::new(binary, mode.as_str(), agent.config(), agent.snapshot());
    let path = file.save()?;
    eprintln!("Session saved to {}", path.display());
    Ok(path)
}

/// Follow-up questions until `quit`, `exit`, `q` or end of input
async fn repl(agent: &mut AgentLoop) -> anyhow::Result<()> {
    eprintln!("\nEntering interactive mode. Type 'quit' or 'exit' to stop.\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();
    loop {
        stderr.write_all(b"> ").await?;
        stderr.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if question.is_empty() {
            continue;
        }
        if let RunOutcome::Interrupted = agent.ask(question).await? {
            eprintln!("Type your next question, or 'quit' to stop.");
        }
    }
    Ok(())
}
