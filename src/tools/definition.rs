// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool definition types
//!
//! These types are used to define tools for the LLM.

use serde_json::Value;

use crate::llm::provider::ToolInputSchema;

/// Helper to create a tool input schema
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "string",
                "description": description
            }),
            required,
        )
    }

    /// Add an integer property
    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "integer",
                "description": description
            }),
            required,
        )
    }

    /// Add an optional integer property with a documented default
    pub fn integer_with_default(self, name: &str, description: &str, default: i64) -> Self {
        self.property(
            name,
            serde_json::json!({
                "type": "integer",
                "description": description,
                "default": default
            }),
            false,
        )
    }

    /// Build the schema
    pub fn build(self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Value::Object(self.properties),
            required: self.required,
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a required string argument
pub fn require_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, crate::error::ToolError> {
    args.get(name).and_then(Value::as_str).ok_or_else(|| {
        crate::error::ToolError::invalid_arguments(format!("missing string argument '{name}'"))
    })
}

/// Read an optional integer argument. Numeric strings are accepted.
pub fn optional_u64(args: &Value, name: &str) -> Result<Option<u64>, crate::error::ToolError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            crate::error::ToolError::invalid_arguments(format!(
                "'{name}' must be a non-negative integer"
            ))
        }),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| {
            crate::error::ToolError::invalid_arguments(format!(
                "'{name}' must be a non-negative integer, got {s:?}"
            ))
        }),
        Some(other) => Err(crate::error::ToolError::invalid_arguments(format!(
            "'{name}' must be a non-negative integer, got {other}"
        ))),
    }
}
