// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File-level tools that work without the decompiler
//!
//! Every tool is bound to the binary under analysis and takes no path
//! argument from the model.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::definition::{optional_u64, SchemaBuilder};
use super::{handler_fn, ToolOutput, ToolRegistry};
use crate::error::{Result, ToolError};
use crate::llm::provider::{ToolDefinition, ToolInputSchema};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MIN_STRING_LENGTH: u64 = 4;

/// Register the file tools for `binary`
pub fn register(registry: &mut ToolRegistry, binary: &Path) -> Result<()> {
    let path = Arc::new(binary.to_path_buf());

    let p = path.clone();
    registry.register(
        ToolDefinition::new(
            "file_info",
            "Get file type and format information using the 'file' command. Quick way to identify architecture, format (ELF/Mach-O/PE), and whether it's stripped.",
            ToolInputSchema::empty(),
        ),
        handler_fn(move |_| {
            let p = p.clone();
            async move { file_info(&p).await }
        }),
    )?;

    let p = path.clone();
    registry.register(
        ToolDefinition::new(
            "binary_info",
            "Get binary header info and shared library dependencies using otool (macOS) or readelf (Linux).",
            ToolInputSchema::empty(),
        ),
        handler_fn(move |_| {
            let p = p.clone();
            async move { binary_info(&p).await }
        }),
    )?;

    let p = path.clone();
    registry.register(
        ToolDefinition::new(
            "raw_strings",
            "Extract printable ASCII strings from the binary. Faster than the decompiler's string analysis but less precise.",
            SchemaBuilder::new()
                .integer_with_default(
                    "min_length",
                    "Minimum string length (default: 4)",
                    DEFAULT_MIN_STRING_LENGTH as i64,
                )
                .build(),
        ),
        handler_fn(move |args: Value| {
            let p = p.clone();
            async move {
                let min_length = optional_u64(&args, "min_length")?
                    .unwrap_or(DEFAULT_MIN_STRING_LENGTH)
                    .max(1) as usize;
                let data = tokio::fs::read(p.as_path()).await?;
                Ok::<_, ToolError>(Value::String(printable_strings(&data, min_length).join("\n")))
            }
        }),
    )?;

    let p = path;
    registry.register(
        ToolDefinition::new(
            "binary_size",
            "Get the file size and SHA256 hash of the binary.",
            ToolInputSchema::empty(),
        ),
        handler_fn(move |_| {
            let p = p.clone();
            async move { binary_size(&p).await }
        }),
    )?;

    Ok(())
}

/// Run a command with a timeout, returning trimmed stdout
async fn run_command(program: &str, args: &[&str], path: &Path) -> std::io::Result<String> {
    let output = timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).arg(path).output(),
    )
    .await
    .map_err(|_| std::io::Error::new(ErrorKind::TimedOut, format!("{program} timed out")))??;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn file_info(path: &Path) -> ToolOutput {
    let out = run_command("file", &[], path).await?;
    Ok(Value::String(out))
}

async fn binary_info(path: &Path) -> ToolOutput {
    match run_command("otool", &["-h"], path).await {
        Ok(header) => {
            let libs = run_command("otool", &["-L"], path).await?;
            return Ok(Value::String(format!(
                "=== Mach-O Header ===\n{header}\n\n=== Shared Libraries ===\n{libs}"
            )));
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    match run_command("readelf", &["-h"], path).await {
        Ok(header) => Ok(Value::String(format!("=== ELF Header ===\n{header}"))),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ToolError::new(
            "ToolNotFound",
            "neither otool nor readelf found",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn binary_size(path: &Path) -> ToolOutput {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(json!({
        "file_size": size,
        "file_size_human": format_size(size),
        "sha256": format!("{:x}", hasher.finalize()),
    }))
}

/// Runs of printable ASCII (space through tilde, plus tab) at least `min_length` long
pub fn printable_strings(data: &[u8], min_length: usize) -> Vec<String> {
    data.split(|b| !(b.is_ascii_graphic() || *b == b' ' || *b == b'\t'))
        .filter(|run| run.len() >= min_length)
        .map(|run| String::from_utf8_lossy(run).into_owned())
        .collect()
}

/// `1.5 KB`, `12.0 B`
pub fn format_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}
