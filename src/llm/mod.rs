// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for unfold
//!
//! Provides the backend-neutral message model, the protocol adapters that
//! translate it to each wire format, streaming reassembly and usage accounting.

pub mod factory;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod streaming;
pub mod usage;

pub use factory::AdapterFactory;
pub use message::*;
pub use provider::*;
pub use usage::{PriceTable, UsageLedger, UsageSnapshot};
