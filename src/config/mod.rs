// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module for unfold
//!
//! Handles layered loading of the TOML config files, environment variables
//! and command-line overrides.

pub mod settings;

pub use settings::*;
