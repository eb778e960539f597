// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response reassembly
//!
//! Folds an ordered sequence of [`StreamEvent`]s into one canonical
//! assistant message. State lives for a single streamed turn and is dropped
//! once [`StreamAssembler::finish`] has produced the response.

use std::collections::HashMap;

use futures::StreamExt;

use crate::error::{ApiError, Result, UnfoldError};
use crate::llm::message::{ContentPart, Message};
use crate::llm::provider::{
    BlockStart, CompletionResponse, ContentDelta, EventStream, StopReason, StreamEvent, Usage,
};

/// A content unit opened by the stream
#[derive(Debug)]
enum OpenUnit {
    Text(String),
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: String,
    },
}

#[derive(Debug)]
struct Unit {
    index: usize,
    state: OpenUnit,
    finished: Option<ContentPart>,
}

impl Unit {
    fn close(&mut self) {
        if self.finished.is_some() {
            return;
        }
        let part = match &mut self.state {
            OpenUnit::Text(buffer) => ContentPart::text(std::mem::take(buffer)),
            OpenUnit::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => {
                let call_id = if call_id.is_empty() {
                    format!("call_{}", self.index)
                } else {
                    std::mem::take(call_id)
                };
                ContentPart::tool_call(
                    call_id,
                    std::mem::take(tool_name),
                    parse_arguments(arguments),
                )
            }
        };
        self.finished = Some(part);
    }
}

/// Parse accumulated argument fragments. Malformed JSON yields `{}`.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed tool arguments");
            serde_json::json!({})
        }
    }
}

/// Accumulator for one streamed turn
#[derive(Debug, Default)]
pub struct StreamAssembler {
    /// Units in the order their indices were first seen
    units: Vec<Unit>,
    /// Stream index -> position in `units` of the currently open unit
    open: HashMap<usize, usize>,
    id: String,
    model: String,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
    /// Re-sort finished tool calls by `call_id`
    order_by_call_id: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-sort tool calls by `call_id` in [`finish`](Self::finish). Off by
    /// default, so tool calls keep the order their units were first seen.
    pub fn with_call_id_ordering(mut self, enabled: bool) -> Self {
        self.order_by_call_id = enabled;
        self
    }

    /// Stop reason seen so far
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Apply one event. An in-stream error event is fatal for the turn.
    pub fn process_event(&mut self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::MessageStart { id, model, usage } => {
                self.id = id;
                self.model = model;
                if let Some(usage) = usage {
                    self.merge_usage(usage);
                }
            }
            StreamEvent::ContentBlockStart { index, block } => self.start_unit(index, block),
            StreamEvent::ContentBlockDelta { index, delta } => {
                let position = self.unit_for_delta(index, &delta);
                match (&mut self.units[position].state, delta) {
                    (OpenUnit::Text(buffer), ContentDelta::Text { text }) => {
                        buffer.push_str(&text);
                    }
                    (OpenUnit::ToolCall { arguments, .. }, ContentDelta::Arguments { partial_json }) => {
                        arguments.push_str(&partial_json);
                    }
                    (_, delta) => {
                        tracing::debug!(index, ?delta, "ignoring delta for mismatched unit");
                    }
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some(position) = self.open.remove(&index) {
                    self.units[position].close();
                }
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    self.merge_usage(usage);
                }
            }
            StreamEvent::MessageStop | StreamEvent::Ping => {}
            StreamEvent::Error {
                error_type,
                message,
            } => {
                return Err(UnfoldError::Api(ApiError::StreamError(format!(
                    "{}: {}",
                    error_type, message
                ))));
            }
        }
        Ok(())
    }

    fn merge_usage(&mut self, usage: Usage) {
        self.usage.get_or_insert_with(Usage::default).merge(usage);
    }

    fn start_unit(&mut self, index: usize, block: BlockStart) {
        if let Some(&position) = self.open.get(&index) {
            // A repeated header refines an open tool call (ids and names may
            // arrive in separate fragments).
            if let (
                OpenUnit::ToolCall {
                    call_id, tool_name, ..
                },
                BlockStart::ToolCall {
                    call_id: new_id,
                    tool_name: new_name,
                },
            ) = (&mut self.units[position].state, &block)
            {
                if !new_id.is_empty() {
                    *call_id = new_id.clone();
                }
                if !new_name.is_empty() {
                    *tool_name = new_name.clone();
                }
                return;
            }
            self.units[position].close();
        }

        let state = match block {
            BlockStart::Text { text } => OpenUnit::Text(text),
            BlockStart::ToolCall { call_id, tool_name } => OpenUnit::ToolCall {
                call_id,
                tool_name,
                arguments: String::new(),
            },
        };
        self.push_unit(index, state);
    }

    fn unit_for_delta(&mut self, index: usize, delta: &ContentDelta) -> usize {
        if let Some(&position) = self.open.get(&index) {
            return position;
        }
        let state = match delta {
            ContentDelta::Text { .. } => OpenUnit::Text(String::new()),
            ContentDelta::Arguments { .. } => OpenUnit::ToolCall {
                call_id: String::new(),
                tool_name: String::new(),
                arguments: String::new(),
            },
        };
        self.push_unit(index, state)
    }

    fn push_unit(&mut self, index: usize, state: OpenUnit) -> usize {
        let position = self.units.len();
        self.units.push(Unit {
            index,
            state,
            finished: None,
        });
        self.open.insert(index, position);
        position
    }

    /// Close any still-open units and build the final response.
    ///
    /// Parts keep first-seen order. With call-id ordering on, tool calls are
    /// re-sorted by `call_id` among their own positions.
    pub fn finish(mut self) -> CompletionResponse {
        let mut parts: Vec<ContentPart> = self
            .units
            .iter_mut()
            .filter_map(|unit| {
                unit.close();
                unit.finished.take()
            })
            .collect();

        if self.order_by_call_id {
            sort_tool_calls(&mut parts);
        }

        CompletionResponse {
            id: self.id,
            model: self.model,
            message: Message::assistant_parts(parts),
            stop_reason: self.stop_reason,
            usage: self.usage,
        }
    }
}

/// Sort tool calls by `call_id` in place, leaving other parts where they are
fn sort_tool_calls(parts: &mut [ContentPart]) {
    let slots: Vec<usize> = parts
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_tool_call())
        .map(|(i, _)| i)
        .collect();
    let mut calls: Vec<ContentPart> = slots.iter().map(|&i| parts[i].clone()).collect();
    calls.sort_by(|a, b| call_id_of(a).cmp(call_id_of(b)));
    for (slot, call) in slots.into_iter().zip(calls) {
        parts[slot] = call;
    }
}

fn call_id_of(part: &ContentPart) -> &str {
    match part {
        ContentPart::ToolCallRequest { call_id, .. } => call_id,
        _ => "",
    }
}

/// Drain an event stream into a response, handing every event to
/// `observer` before it is applied.
pub async fn collect_stream<F>(stream: EventStream, observer: F) -> Result<CompletionResponse>
where
    F: FnMut(&StreamEvent),
{
    collect_stream_with(stream, StreamAssembler::new(), observer).await
}

/// [`collect_stream`] into a preconfigured assembler
pub async fn collect_stream_with<F>(
    mut stream: EventStream,
    mut assembler: StreamAssembler,
    mut observer: F,
) -> Result<CompletionResponse>
where
    F: FnMut(&StreamEvent),
{
    while let Some(event) = stream.next().await {
        let event = event?;
        observer(&event);
        assembler.process_event(event)?;
    }
    Ok(assembler.finish())
}

/// Builders for stream events in tests
#[cfg(test)]
pub(crate) mod events {
    use super::*;

    pub fn text_start(index: usize) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            block: BlockStart::Text {
                text: String::new(),
            },
        }
    }

    pub fn tool_start(index: usize, id: &str, name: &str) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            block: BlockStart::ToolCall {
                call_id: id.to_string(),
                tool_name: name.to_string(),
            },
        }
    }

    pub fn text_delta(index: usize, text: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::Text {
                text: text.to_string(),
            },
        }
    }

    pub fn args_delta(index: usize, json: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::Arguments {
                partial_json: json.to_string(),
            },
        }
    }

    pub fn stop(index: usize) -> StreamEvent {
        StreamEvent::ContentBlockStop { index }
    }
}
