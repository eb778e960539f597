// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for unfold
//!
//! Argument parsing and the terminal renderer for agent output.

pub mod args;
pub mod render;

pub use args::*;
pub use render::TerminalObserver;
