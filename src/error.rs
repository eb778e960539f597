// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for unfold
//!
//! Fatal conditions surface as [`UnfoldError`] to the caller of `run`/`ask`.
//! Per-tool-call failures are plain data ([`ToolError`]) and never leave the
//! tool registry as errors.

use thiserror::Error;

/// Main error type for unfold operations
#[derive(Error, Debug)]
pub enum UnfoldError {
    /// Backend transport or protocol failure, tagged with the backend name
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: String,
        #[source]
        source: ApiError,
    },

    /// API-related errors not yet attributed to a backend
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// A tool with the same name is already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session persistence errors
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl UnfoldError {
    /// Attach a backend name to an API-level failure.
    pub fn backend(backend: impl Into<String>, source: ApiError) -> Self {
        UnfoldError::Backend {
            backend: backend.into(),
            source,
        }
    }

    /// Tag an unattributed transport failure with the backend that raised it.
    pub fn with_backend(self, backend: &str) -> Self {
        match self {
            UnfoldError::Api(source) => UnfoldError::backend(backend, source),
            UnfoldError::Http(err) => {
                let source = if err.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::Network(err.to_string())
                };
                UnfoldError::backend(backend, source)
            }
            other => other,
        }
    }

    /// Whether this error came from talking to an LLM backend.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            UnfoldError::Backend { .. } | UnfoldError::Api(_) | UnfoldError::Http(_)
        )
    }
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Context window exceeded
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for unfold operations
pub type Result<T> = std::result::Result<T, UnfoldError>;

impl From<toml::de::Error> for UnfoldError {
    fn from(err: toml::de::Error) -> Self {
        UnfoldError::Toml(err.to_string())
    }
}

/// A recoverable failure raised by a tool handler.
///
/// `kind` is a short class name such as `InvalidArguments` or `Timeout`;
/// the registry renders it as `{"error": "<kind>: <message>"}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Missing or mistyped arguments.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new("InvalidArguments", message)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::new("IoError", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = UnfoldError::backend("anthropic", ApiError::AuthenticationFailed);
        assert_eq!(
            err.to_string(),
            "anthropic backend error: Authentication failed: invalid API key"
        );
        assert!(err.is_backend());
    }

    #[test]
    fn test_with_backend_tags_api_errors() {
        let err = UnfoldError::Api(ApiError::RateLimited(5)).with_backend("openai");
        match err {
            UnfoldError::Backend { backend, source } => {
                assert_eq!(backend, "openai");
                assert!(matches!(source, ApiError::RateLimited(5)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_with_backend_leaves_other_errors() {
        let err = UnfoldError::Config("x".to_string()).with_backend("openai");
        assert!(matches!(err, UnfoldError::Config(_)));
    }

    #[test]
    fn test_duplicate_tool_display() {
        let err = UnfoldError::DuplicateTool("echo".to_string());
        assert_eq!(err.to_string(), "Duplicate tool: echo");
        assert!(!err.is_backend());
    }

    #[test]
    fn test_config_error() {
        let err = UnfoldError::Config("bad config".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_session_error() {
        let err = UnfoldError::Session("missing".to_string());
        assert!(err.to_string().contains("Session error"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: UnfoldError = parsed.unwrap_err().into();
        assert!(matches!(err, UnfoldError::Toml(_)));
    }

    #[test]
    fn test_api_error_conversion() {
        let err: UnfoldError = ApiError::Timeout.into();
        assert!(matches!(err, UnfoldError::Api(ApiError::Timeout)));
        assert!(err.is_backend());
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::new("ValueError", "bad address");
        assert_eq!(err.to_string(), "ValueError: bad address");
    }

    #[test]
    fn test_tool_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ToolError = io.into();
        assert_eq!(err.kind, "IoError");
        assert_eq!(err.message, "gone");
    }

    #[test]
    fn test_invalid_arguments() {
        let err = ToolError::invalid_arguments("missing 'target'");
        assert_eq!(err.kind, "InvalidArguments");
    }
}
