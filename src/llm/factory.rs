// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Adapter factory for creating protocol adapters
//!
//! The backend is chosen once, from configuration, and the resulting adapter
//! is handed to the agent loop.

use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::error::{Result, UnfoldError};
use crate::llm::provider::ProtocolAdapter;
use crate::llm::providers::{AnthropicAdapter, OpenAiAdapter};

/// Factory for creating protocol adapters
pub struct AdapterFactory;

impl AdapterFactory {
    /// Create the adapter selected by `config.backend`
    pub fn from_config(config: &Config) -> Result<Arc<dyn ProtocolAdapter>> {
        let api_key = config.api_key().ok_or_else(|| {
            UnfoldError::Config(format!(
                "No API key found. Set the {} environment variable.",
                config.backend.key_env()
            ))
        })?;
        Ok(Self::create(
            config.backend.kind,
            api_key,
            config.backend.base_url.as_deref(),
        ))
    }

    /// Create an adapter for an explicit backend kind
    pub fn create(
        kind: BackendKind,
        api_key: String,
        base_url: Option<&str>,
    ) -> Arc<dyn ProtocolAdapter> {
        tracing::debug!(?kind, base_url = ?base_url, "creating protocol adapter");
        match (kind, base_url) {
            (BackendKind::Native, Some(url)) => {
                Arc::new(AnthropicAdapter::with_base_url(api_key, url))
            }
            (BackendKind::Native, None) => Arc::new(AnthropicAdapter::new(api_key)),
            (BackendKind::OpenAi, Some(url)) => {
                Arc::new(OpenAiAdapter::with_base_url(api_key, url))
            }
            (BackendKind::OpenAi, None) => Arc::new(OpenAiAdapter::new(api_key)),
        }
    }
}
