// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for unfold
//!
//! Tools are registered by name with a definition (description and parameter
//! schema) and a handler. Dispatch never fails: unknown names and handler
//! failures come back as `{"error": ...}` payloads that are fed to the model
//! so it can correct itself.
//!
//! Some backends and proxies decorate tool names (`proxy_decompile`,
//! `functions.decompile`); [`ToolRegistry::dispatch`] strips those prefixes
//! when the decorated name is not registered itself.

pub mod decompiler;
pub mod definition;
pub mod file_tools;

pub use decompiler::{DecompilerBackend, DecompilerHandle, HttpDecompilerBackend};
pub use definition::*;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::{Result, ToolError, UnfoldError};
use crate::llm::provider::ToolDefinition;

/// Prefixes that backends and proxies prepend to tool names
pub const TOOL_NAME_PREFIXES: [&str; 3] = ["proxy_", "functions.", "tools."];

/// Result of a tool handler. Strings pass through to the model verbatim,
/// anything else is pretty-printed JSON.
pub type ToolOutput = std::result::Result<Value, ToolError>;

/// Trait for implementing tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool with the model-supplied arguments
    async fn call(&self, args: Value) -> ToolOutput;
}

/// Adapter turning an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = ToolOutput> + Send,
{
    async fn call(&self, args: Value) -> ToolOutput {
        (self.0)(args).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolOutput> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    /// Names in registration order
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the file tools and decompiler tools for one binary
    pub fn for_binary(binary: &Path, decompiler: Arc<DecompilerHandle>) -> Result<Self> {
        let mut registry = Self::new();
        decompiler::register(&mut registry, binary, decompiler)?;
        file_tools::register(&mut registry, binary)?;
        Ok(registry)
    }

    /// Register a tool. Names are unique.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        if self.tools.contains_key(&definition.name) {
            return Err(UnfoldError::DuplicateTool(definition.name));
        }
        let name = definition.name.clone();
        self.order.push(name.clone());
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                handler,
            },
        );
        Ok(())
    }

    /// Resolve a possibly decorated name to a registered one
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some((key, _)) = self.tools.get_key_value(name) {
            return Some(key.as_str());
        }
        TOOL_NAME_PREFIXES.iter().find_map(|prefix| {
            let stripped = name.strip_prefix(prefix)?;
            self.tools
                .get_key_value(stripped)
                .map(|(key, _)| key.as_str())
        })
    }

    /// Invoke a tool by name and render its result for the model
    pub async fn dispatch(&self, name: &str, args: Value) -> String {
        let Some(tool) = self.resolve(name).and_then(|n| self.tools.get(n)) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return error_payload(&format!("Unknown tool: {name}"));
        };

        let tool_name = tool.definition.name.as_str();
        tracing::debug!(tool = %tool_name, requested = %name, "dispatching tool");

        match tool.handler.call(args).await {
            Ok(Value::String(text)) => text,
            Ok(value @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            Ok(value) => value.to_string(),
            Err(err) => {
                tracing::debug!(tool = %tool_name, error = %err, "tool failed");
                let err = advise(tool_name, err);
                error_payload(&err.to_string())
            }
        }
    }

    /// Get all tool definitions, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition.clone())
            .collect()
    }

    /// List all tool names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// `{"error": "<text>"}`
pub fn error_payload(text: &str) -> String {
    serde_json::json!({ "error": text }).to_string()
}

/// Rewrite two failure signatures into actionable guidance. The kind is kept.
fn advise(tool: &str, err: ToolError) -> ToolError {
    static OUT_OF_MEMORY: OnceLock<Regex> = OnceLock::new();
    let out_of_memory = OUT_OF_MEMORY.get_or_init(|| {
        Regex::new(r"(?i)\bjvm\b|outofmemory|out of memory|java heap space")
            .expect("static regex is valid")
    });

    if err.kind.to_lowercase().contains("jvm") || out_of_memory.is_match(&err.message) {
        ToolError::new(
            err.kind,
            format!(
                "JVM error during {tool}: {}. If this is an OutOfMemoryError, try: export _JAVA_OPTIONS='-Xmx4g'",
                err.message
            ),
        )
    } else if err.kind == "NullReference" || err.message.contains("NullPointerException") {
        ToolError::new(
            err.kind,
            format!(
                "Decompiler returned null during {tool}. The binary may not have been analyzed yet; try analyze_binary first."
            ),
        )
    } else {
        err
    }
}
