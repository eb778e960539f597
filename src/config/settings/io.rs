// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::{Result, UnfoldError};

use super::migration;
use super::{Config, ConfigOverrides, EnvLookup};

impl Config {
    /// Global config file path.
    pub fn global_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("unfold")
            .join("config.toml")
    }

    /// Per-directory config file path.
    pub fn local_path() -> PathBuf {
        PathBuf::from(".unfold.toml")
    }

    /// Load from the default files and the process environment, then apply overrides.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        Self::load_with(
            &[Self::global_path(), Self::local_path()],
            &env,
            overrides,
        )
    }

    /// Layered load. Files are given lowest priority first; missing files are skipped.
    pub fn load_with(
        files: &[PathBuf],
        env: EnvLookup<'_>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in files {
            if !path.exists() {
                continue;
            }
            tracing::debug!(path = %path.display(), "loading config file");
            merged = migration::deep_merge(merged, Self::read_file(path)?);
        }

        let mut config: Config = merged.try_into().map_err(|e: toml::de::Error| {
            UnfoldError::Config(format!("Invalid configuration: {e}"))
        })?;
        config.apply_env(env)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Load a single config file on top of the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::read_file(path)?.try_into().map_err(|e: toml::de::Error| {
            UnfoldError::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })
    }

    fn read_file(path: &Path) -> Result<toml::Value> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            UnfoldError::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Save to a specific path as TOML.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| UnfoldError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the unfold home directory (~/.unfold or $UNFOLD_HOME).
    pub fn unfold_home() -> PathBuf {
        if let Ok(home) = std::env::var("UNFOLD_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".unfold")
    }

    /// Get the sessions directory.
    pub fn sessions_dir() -> PathBuf {
        Self::unfold_home().join("sessions")
    }
}
