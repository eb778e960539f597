// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Token usage accounting
//!
//! The ledger observes every backend response, whichever protocol produced
//! it, and keeps running totals plus one record per reporting call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::llm::provider::Usage;

/// Per-call usage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Cost per one million tokens, in USD
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Model name -> price lookup
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("claude-sonnet-4-5-20250929", 3.0, 15.0);
        table.insert("claude-opus-4-5-20250514", 15.0, 75.0);
        table.insert("claude-haiku-3-5-20241022", 0.80, 4.0);
        table
    }
}

impl PriceTable {
    /// A table that prices nothing
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model: impl Into<String>, input: f64, output: f64) {
        self.prices.insert(
            model.into(),
            ModelPrice {
                input_per_million: input,
                output_per_million: output,
            },
        );
    }

    pub fn get(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }
}

/// Totals saved with a session or report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub api_calls: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

/// Append-only usage log for one agent session
#[derive(Debug, Clone)]
pub struct UsageLedger {
    model: String,
    prices: PriceTable,
    input_tokens: u64,
    output_tokens: u64,
    api_calls: u64,
    records: Vec<UsageRecord>,
}

impl UsageLedger {
    /// Ledger for `model` priced with the built-in table
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_prices(model, PriceTable::default())
    }

    pub fn with_prices(model: impl Into<String>, prices: PriceTable) -> Self {
        Self {
            model: model.into(),
            prices,
            input_tokens: 0,
            output_tokens: 0,
            api_calls: 0,
            records: Vec::new(),
        }
    }

    /// Record one call's token counts
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.api_calls += 1;
        self.records.push(UsageRecord {
            input_tokens,
            output_tokens,
        });
    }

    /// Record a response's usage. A response without usage is a no-op.
    pub fn observe(&mut self, usage: Option<Usage>) {
        match usage {
            Some(usage) => self.record(usage.input_tokens, usage.output_tokens),
            None => tracing::debug!("response carried no usage"),
        }
    }

    /// Restore totals from a saved snapshot. Per-call records are not kept
    /// in snapshots, so the log starts empty.
    pub fn restore(&mut self, snapshot: &UsageSnapshot) {
        self.input_tokens = snapshot.input_tokens;
        self.output_tokens = snapshot.output_tokens;
        self.api_calls = snapshot.api_calls;
        self.records.clear();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    /// Estimated cost in USD; exactly 0 for an unpriced model
    pub fn estimated_cost(&self) -> f64 {
        match self.prices.get(&self.model) {
            Some(price) => {
                (self.input_tokens as f64 * price.input_per_million
                    + self.output_tokens as f64 * price.output_per_million)
                    / 1_000_000.0
            }
            None => 0.0,
        }
    }

    /// Human-readable totals, one per line
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("API calls: {}", self.api_calls),
            format!("Input tokens: {}", group_thousands(self.input_tokens)),
            format!("Output tokens: {}", group_thousands(self.output_tokens)),
            format!("Total tokens: {}", group_thousands(self.total_tokens())),
        ];
        let cost = self.estimated_cost();
        if cost > 0.0 {
            lines.push(format!("Estimated cost: ${cost:.4}"));
        }
        lines.join("\n")
    }

    /// Totals for export. Cost is rounded to six places and omitted when zero.
    pub fn export(&self) -> UsageSnapshot {
        let cost = self.estimated_cost();
        UsageSnapshot {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.total_tokens(),
            api_calls: self.api_calls,
            estimated_cost_usd: (cost > 0.0).then(|| (cost * 1_000_000.0).round() / 1_000_000.0),
        }
    }
}

/// Format with comma thousands separators
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
