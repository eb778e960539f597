// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Decompiler-backed tools
//!
//! Binary analysis is delegated to an external decompiler service behind
//! [`DecompilerBackend`]. The backend is started lazily by the first tool
//! that needs it; [`DecompilerHandle`] owns that one-time start and the
//! matching shutdown.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[cfg(test)]
use mockall::automock;

use super::definition::{optional_u64, require_str, SchemaBuilder};
use super::{ToolHandler, ToolOutput, ToolRegistry};
use crate::error::{Result, ToolError};
use crate::llm::provider::{ToolDefinition, ToolInputSchema};

/// Default and maximum byte counts for `read_bytes`
pub const READ_BYTES_DEFAULT: u64 = 64;
pub const READ_BYTES_MAX: u64 = 1024;

/// Operations the decompiler service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompilerOperation {
    Analyze,
    ListFunctions,
    Decompile,
    XrefsTo,
    XrefsFrom,
    Strings,
    ImportsExports,
    RenameFunction,
    ReadBytes,
}

impl DecompilerOperation {
    pub const ALL: [DecompilerOperation; 9] = [
        DecompilerOperation::Analyze,
        DecompilerOperation::ListFunctions,
        DecompilerOperation::Decompile,
        DecompilerOperation::XrefsTo,
        DecompilerOperation::XrefsFrom,
        DecompilerOperation::Strings,
        DecompilerOperation::ImportsExports,
        DecompilerOperation::RenameFunction,
        DecompilerOperation::ReadBytes,
    ];

    /// Tool name exposed to the model
    pub fn tool_name(self) -> &'static str {
        match self {
            DecompilerOperation::Analyze => "analyze_binary",
            DecompilerOperation::ListFunctions => "list_functions",
            DecompilerOperation::Decompile => "decompile",
            DecompilerOperation::XrefsTo => "get_xrefs_to",
            DecompilerOperation::XrefsFrom => "get_xrefs_from",
            DecompilerOperation::Strings => "get_strings",
            DecompilerOperation::ImportsExports => "get_imports_exports",
            DecompilerOperation::RenameFunction => "rename_function",
            DecompilerOperation::ReadBytes => "read_bytes",
        }
    }

    fn description(self) -> &'static str {
        match self {
            DecompilerOperation::Analyze => "Import and run full analysis on the binary. Must be called before other decompiler tools. Returns architecture, format and function count.",
            DecompilerOperation::ListFunctions => "List all functions in the binary with their names, addresses and sizes.",
            DecompilerOperation::Decompile => "Decompile a function to C pseudocode. Accepts a function name (e.g. 'main') or a hex address (e.g. '0x100000460').",
            DecompilerOperation::XrefsTo => "Find all cross-references TO a function or address, i.e. its callers.",
            DecompilerOperation::XrefsFrom => "Find all cross-references FROM a function or address, i.e. what it calls.",
            DecompilerOperation::Strings => "Extract all defined strings with their addresses. Useful for passwords, error messages, URLs, paths and format strings.",
            DecompilerOperation::ImportsExports => "List imported library functions and exported symbols.",
            DecompilerOperation::RenameFunction => "Rename a function to a more meaningful name, given its current name or address.",
            DecompilerOperation::ReadBytes => "Read raw bytes at an address. Returns a hex dump with an ASCII column.",
        }
    }

    fn schema(self) -> ToolInputSchema {
        match self {
            DecompilerOperation::Decompile => SchemaBuilder::new()
                .string("function", "Function name or hex address to decompile", true)
                .build(),
            DecompilerOperation::XrefsTo => SchemaBuilder::new()
                .string("target", "Function name or hex address to find references to", true)
                .build(),
            DecompilerOperation::XrefsFrom => SchemaBuilder::new()
                .string("target", "Function name or hex address to find references from", true)
                .build(),
            DecompilerOperation::RenameFunction => SchemaBuilder::new()
                .string("target", "Current function name or hex address", true)
                .string("new_name", "New descriptive name for the function", true)
                .build(),
            DecompilerOperation::ReadBytes => SchemaBuilder::new()
                .string("address", "Hex address to read from (e.g. '0x100000460')", true)
                .integer_with_default(
                    "count",
                    "Number of bytes to read (default: 64, max: 1024)",
                    READ_BYTES_DEFAULT as i64,
                )
                .build(),
            _ => ToolInputSchema::empty(),
        }
    }

    /// Validate model-supplied arguments into the payload sent to the backend
    pub fn normalize_args(self, args: &Value) -> std::result::Result<Value, ToolError> {
        Ok(match self {
            DecompilerOperation::Decompile => {
                json!({ "function": require_str(args, "function")? })
            }
            DecompilerOperation::XrefsTo | DecompilerOperation::XrefsFrom => {
                json!({ "target": require_str(args, "target")? })
            }
            DecompilerOperation::RenameFunction => json!({
                "target": require_str(args, "target")?,
                "new_name": require_str(args, "new_name")?,
            }),
            DecompilerOperation::ReadBytes => {
                let count = optional_u64(args, "count")?
                    .unwrap_or(READ_BYTES_DEFAULT)
                    .min(READ_BYTES_MAX);
                json!({ "address": require_str(args, "address")?, "count": count })
            }
            _ => json!({}),
        })
    }
}

/// An external decompiler service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DecompilerBackend: Send + Sync {
    /// Bring the service up. Called at most once per handle.
    async fn start(&self) -> std::result::Result<(), ToolError>;

    /// Run one operation against `binary`
    async fn invoke(
        &self,
        operation: DecompilerOperation,
        binary: &Path,
        args: Value,
    ) -> ToolOutput;

    /// Release the service
    async fn shutdown(&self) -> std::result::Result<(), ToolError>;
}

/// Lazily started, shared access to one decompiler backend
pub struct DecompilerHandle {
    backend: Arc<dyn DecompilerBackend>,
    started: OnceCell<()>,
    stopped: AtomicBool,
}

impl DecompilerHandle {
    pub fn new(backend: Arc<dyn DecompilerBackend>) -> Self {
        Self {
            backend,
            started: OnceCell::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Whether the backend has been started
    pub fn is_started(&self) -> bool {
        self.started.initialized()
    }

    /// Start the backend on first use, then run the operation
    pub async fn invoke(
        &self,
        operation: DecompilerOperation,
        binary: &Path,
        args: Value,
    ) -> ToolOutput {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ToolError::new(
                "BackendStopped",
                "the decompiler backend has been shut down",
            ));
        }
        self.started
            .get_or_try_init(|| async {
                tracing::info!("starting decompiler backend");
                self.backend.start().await
            })
            .await?;
        self.backend.invoke(operation, binary, args).await
    }

    /// Shut the backend down if it was started. Later calls fail.
    pub async fn shutdown(&self) -> std::result::Result<(), ToolError> {
        if self.stopped.swap(true, Ordering::SeqCst) || !self.is_started() {
            return Ok(());
        }
        tracing::info!("shutting down decompiler backend");
        self.backend.shutdown().await
    }
}

/// One decompiler operation exposed as a tool
struct DecompilerTool {
    handle: Arc<DecompilerHandle>,
    binary: PathBuf,
    operation: DecompilerOperation,
}

#[async_trait]
impl ToolHandler for DecompilerTool {
    async fn call(&self, args: Value) -> ToolOutput {
        let args = self.operation.normalize_args(&args)?;
        self.handle.invoke(self.operation, &self.binary, args).await
    }
}

/// Register every decompiler tool for `binary`
pub fn register(
    registry: &mut ToolRegistry,
    binary: &Path,
    handle: Arc<DecompilerHandle>,
) -> Result<()> {
    for operation in DecompilerOperation::ALL {
        registry.register(
            ToolDefinition::new(
                operation.tool_name(),
                operation.description(),
                operation.schema(),
            ),
            Arc::new(DecompilerTool {
                handle: handle.clone(),
                binary: binary.to_path_buf(),
                operation,
            }),
        )?;
    }
    Ok(())
}

/// Decompiler service reached over HTTP
///
/// `GET {base}/health` starts, `POST {base}/invoke` runs an operation with
/// `{operation, binary, project_dir, args}` and `POST {base}/shutdown` stops.
/// The service answers `{"result": ...}` or `{"error": {"kind", "message"}}`.
pub struct HttpDecompilerBackend {
    client: Client,
    base_url: String,
    project_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    operation: DecompilerOperation,
    binary: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_dir: Option<&'a Path>,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<InvokeError>,
}

#[derive(Debug, Deserialize)]
struct InvokeError {
    kind: String,
    message: String,
}

impl HttpDecompilerBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_dir: None,
        }
    }

    /// Directory where the service keeps its per-binary projects
    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(project_dir.into());
        self
    }

    fn unavailable(err: reqwest::Error) -> ToolError {
        ToolError::new("BackendUnavailable", err.to_string())
    }
}

#[async_trait]
impl DecompilerBackend for HttpDecompilerBackend {
    async fn start(&self) -> std::result::Result<(), ToolError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(ToolError::new(
                "BackendUnavailable",
                format!("health check returned {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        operation: DecompilerOperation,
        binary: &Path,
        args: Value,
    ) -> ToolOutput {
        let body = InvokeRequest {
            operation,
            binary,
            project_dir: self.project_dir.as_deref(),
            args,
        };
        let response = self
            .client
            .post(format!("{}/invoke", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        let text = response.text().await.map_err(Self::unavailable)?;
        let parsed: InvokeResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ToolError::new(
                    "BackendError",
                    format!("{}: {}", status.as_u16(), text),
                ))
            }
            Err(e) => return Err(ToolError::new("InvalidResponse", e.to_string())),
        };

        match (parsed.error, parsed.result) {
            (Some(error), _) => Err(ToolError::new(error.kind, error.message)),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    async fn shutdown(&self) -> std::result::Result<(), ToolError> {
        self.client
            .post(format!("{}/shutdown", self.base_url))
            .send()
            .await
            .map_err(Self::unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn handle_with(mock: MockDecompilerBackend) -> Arc<DecompilerHandle> {
        Arc::new(DecompilerHandle::new(Arc::new(mock)))
    }

    #[tokio::test]
    async fn test_backend_started_once() {
        let mut mock = MockDecompilerBackend::new();
        mock.expect_start().times(1).returning(|| Ok(()));
        mock.expect_invoke()
            .times(2)
            .returning(|_, _, _| Ok(json!({"ok": true})));

        let handle = handle_with(mock);
        assert!(!handle.is_started());
        let binary = Path::new("/tmp/crackme");
        handle
            .invoke(DecompilerOperation::Analyze, binary, json!({}))
            .await
            .unwrap();
        handle
            .invoke(DecompilerOperation::ListFunctions, binary, json!({}))
            .await
            .unwrap();
        assert!(handle.is_started());
    }

    #[tokio::test]
    async fn test_failed_start_is_retried_next_call() {
        let mut mock = MockDecompilerBackend::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ToolError::new("BackendUnavailable", "not yet")));
        mock.expect_start()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        mock.expect_invoke().returning(|_, _, _| Ok(json!("done")));

        let handle = handle_with(mock);
        let binary = Path::new("/tmp/a");
        let err = handle
            .invoke(DecompilerOperation::Analyze, binary, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "BackendUnavailable");
        assert_eq!(
            handle
                .invoke(DecompilerOperation::Analyze, binary, json!({}))
                .await
                .unwrap(),
            json!("done")
        );
    }

    #[tokio::test]
    async fn test_shutdown_only_when_started() {
        let mut mock = MockDecompilerBackend::new();
        mock.expect_shutdown().times(0);
        let handle = handle_with(mock);
        handle.shutdown().await.unwrap();

        let err = handle
            .invoke(DecompilerOperation::Strings, Path::new("/tmp/a"), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "BackendStopped");
    }

    #[tokio::test]
    async fn test_shutdown_after_start() {
        let mut mock = MockDecompilerBackend::new();
        mock.expect_start().returning(|| Ok(()));
        mock.expect_invoke().returning(|_, _, _| Ok(Value::Null));
        mock.expect_shutdown().times(1).returning(|| Ok(()));
        let handle = handle_with(mock);
        handle
            .invoke(DecompilerOperation::Analyze, Path::new("/tmp/a"), json!({}))
            .await
            .unwrap();
        handle.shutdown().await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_tools_forward_normalized_args() {
        let mut mock = MockDecompilerBackend::new();
        mock.expect_start().returning(|| Ok(()));
        mock.expect_invoke()
            .with(
                eq(DecompilerOperation::ReadBytes),
                always(),
                eq(json!({"address": "0x1000", "count": 1024})),
            )
            .times(1)
            .returning(|_, _, _| Ok(json!({"hex": "00"})));

        let mut registry = ToolRegistry::new();
        register(&mut registry, Path::new("/tmp/a"), handle_with(mock)).unwrap();
        let out = registry
            .dispatch("read_bytes", json!({"address": "0x1000", "count": 5000}))
            .await;
        assert!(out.contains("\"hex\""));
    }

    #[tokio::test]
    async fn test_missing_argument_never_reaches_backend() {
        let mut mock = MockDecompilerBackend::new();
        mock.expect_start().times(0);
        mock.expect_invoke().times(0);

        let mut registry = ToolRegistry::new();
        register(&mut registry, Path::new("/tmp/a"), handle_with(mock)).unwrap();
        let out = registry.dispatch("decompile", json!({})).await;
        assert!(out.contains("InvalidArguments"));
    }

    #[test]
    fn test_register_all_operations() {
        let mut registry = ToolRegistry::new();
        register(
            &mut registry,
            Path::new("/tmp/a"),
            handle_with(MockDecompilerBackend::new()),
        )
        .unwrap();
        assert_eq!(registry.len(), 9);
        let defs = registry.definitions();
        let rename = defs.iter().find(|d| d.name == "rename_function").unwrap();
        assert_eq!(rename.input_schema.required, vec!["target", "new_name"]);
        assert_eq!(defs[0].name, "analyze_binary");
    }

    #[test]
    fn test_normalize_read_bytes_default() {
        let args = DecompilerOperation::ReadBytes
            .normalize_args(&json!({"address": "0x10"}))
            .unwrap();
        assert_eq!(args["count"], 64);
    }

    #[test]
    fn test_operation_serialization() {
        assert_eq!(
            serde_json::to_value(DecompilerOperation::XrefsTo).unwrap(),
            json!("xrefs_to")
        );
    }
}
