// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, UnfoldError};

use super::{BackendKind, Config};

/// Environment variable lookup, injectable for tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| UnfoldError::Config(format!("Invalid value for {key}={raw:?}: {e}")))
}

impl Config {
    /// Apply `UNFOLD_*` variables and the proxy pair on top of the current values.
    pub fn apply_env(&mut self, env: EnvLookup<'_>) -> Result<()> {
        if let Some(model) = env("UNFOLD_MODEL") {
            self.model = model;
        }
        if let Some(raw) = env("UNFOLD_MAX_TURNS") {
            self.max_turns = parse_env("UNFOLD_MAX_TURNS", &raw)?;
        }
        if let Some(raw) = env("UNFOLD_MAX_TOKENS") {
            self.max_tokens = parse_env("UNFOLD_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = env("UNFOLD_TRUNCATION_LIMIT") {
            self.truncation_limit = parse_env("UNFOLD_TRUNCATION_LIMIT", &raw)?;
        }
        if let Some(dir) = env("UNFOLD_PROJECT_DIR") {
            self.project_dir = dir;
        }
        if let Some(raw) = env("UNFOLD_OUTPUT_FORMAT") {
            self.output_format = raw.parse()?;
        }
        if let Some(file) = env("UNFOLD_OUTPUT_FILE") {
            self.output_file = Some(PathBuf::from(file));
        }
        if let Some(url) = env("UNFOLD_DECOMPILER_URL") {
            self.decompiler_url = url;
        }

        // An OpenAI-compatible proxy is selected only when both are present.
        if let (Some(base_url), Some(_)) = (env("CLIPROXY_BASE_URL"), env("CLIPROXY_API_KEY")) {
            tracing::debug!(base_url = %base_url, "using OpenAI-compatible proxy backend");
            self.backend.kind = BackendKind::OpenAi;
            self.backend.base_url = Some(base_url);
            self.backend.api_key_env = Some("CLIPROXY_API_KEY".to_string());
        }
        Ok(())
    }

    /// Get the backend API key, checking the env var first.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(&|key: &str| std::env::var(key).ok())
    }

    /// [`Config::api_key`] against an explicit environment
    pub fn api_key_with(&self, env: EnvLookup<'_>) -> Option<String> {
        // Priority: env var > config file.
        env(self.backend.key_env())
            .filter(|key| !key.is_empty())
            .or_else(|| self.backend.api_key.clone())
    }

    /// Reject values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(UnfoldError::Config("model must not be empty".to_string()));
        }
        if self.max_turns == 0 {
            return Err(UnfoldError::Config(
                "max_turns must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(UnfoldError::Config(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        if self.truncation_limit == 0 {
            return Err(UnfoldError::Config(
                "truncation_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_apply_env_values() {
        let env = env_of(&[
            ("UNFOLD_MODEL", "claude-haiku-3-5-20241022"),
            ("UNFOLD_MAX_TURNS", " 12 "),
            ("UNFOLD_OUTPUT_FORMAT", "json"),
            ("UNFOLD_OUTPUT_FILE", "/tmp/report.json"),
        ]);
        let mut config = Config::default();
        config.apply_env(&env).unwrap();
        assert_eq!(config.model, "claude-haiku-3-5-20241022");
        assert_eq!(config.max_turns, 12);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.output_file, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn test_invalid_numeric_env() {
        let env = env_of(&[("UNFOLD_MAX_TOKENS", "lots")]);
        let err = Config::default().apply_env(&env).unwrap_err();
        assert!(err.to_string().contains("Invalid value for UNFOLD_MAX_TOKENS=\"lots\""));
    }

    #[test]
    fn test_proxy_needs_both_vars() {
        let mut config = Config::default();
        config
            .apply_env(&env_of(&[("CLIPROXY_BASE_URL", "http://localhost:8317/v1")]))
            .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Native);

        config
            .apply_env(&env_of(&[
                ("CLIPROXY_BASE_URL", "http://localhost:8317/v1"),
                ("CLIPROXY_API_KEY", "k"),
            ]))
            .unwrap();
        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(
            config.backend.base_url.as_deref(),
            Some("http://localhost:8317/v1")
        );
        assert_eq!(config.backend.key_env(), "CLIPROXY_API_KEY");
    }

    #[test]
    fn test_api_key_priority() {
        let mut config = Config::default();
        assert_eq!(config.api_key_with(&env_of(&[])), None);

        config.backend.api_key = Some("from-file".to_string());
        assert_eq!(
            config.api_key_with(&env_of(&[])).as_deref(),
            Some("from-file")
        );
        assert_eq!(
            config
                .api_key_with(&env_of(&[("ANTHROPIC_API_KEY", "from-env")]))
                .as_deref(),
            Some("from-env")
        );
        assert_eq!(
            config
                .api_key_with(&env_of(&[("ANTHROPIC_API_KEY", "")]))
                .as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        let config = Config {
            max_turns: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(UnfoldError::Config(_))));
    }
}
