// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent loop execution
//!
//! Each turn sends the whole conversation to the backend, appends the
//! assistant reply, then either finishes or runs the requested tools in
//! order and appends one tool-result message. Turns are strictly sequential.

use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::message::{ContentPart, Conversation, Message};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentDelta, ProtocolAdapter, StopReason, StreamEvent,
};
use crate::llm::streaming::{collect_stream_with, StreamAssembler};
use crate::llm::usage::{UsageLedger, UsageSnapshot};
use crate::tools::{error_payload, ToolRegistry};

use super::observer::{AgentObserver, NoopObserver};
use super::types::{
    preview, truncate_result, AgentConfig, AgentSnapshot, AgentState, InterruptHandle,
    RunOutcome, ToolCallRecord, TurnRecord,
};

/// The turn-scheduling state machine for one agent session
pub struct AgentLoop {
    adapter: Arc<dyn ProtocolAdapter>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    conversation: Conversation,
    turn_log: Vec<TurnRecord>,
    ledger: UsageLedger,
    state: AgentState,
    observer: Box<dyn AgentObserver>,
    interrupt: InterruptHandle,
}

impl AgentLoop {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let ledger = UsageLedger::new(config.model.clone());
        Self {
            adapter,
            tools,
            config,
            conversation: Conversation::new(),
            turn_log: Vec::new(),
            ledger,
            state: AgentState::Idle,
            observer: Box::new(NoopObserver),
            interrupt: InterruptHandle::new(),
        }
    }

    /// Continue a saved session without re-running its turns
    pub fn resume(
        adapter: Arc<dyn ProtocolAdapter>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
        snapshot: AgentSnapshot,
    ) -> Self {
        let mut agent = Self::new(adapter, tools, config);
        agent.ledger.restore(&snapshot.usage);
        agent.conversation = snapshot.messages;
        agent.turn_log = snapshot.turn_log;
        tracing::info!(
            messages = agent.conversation.len(),
            turns = agent.turn_log.len(),
            "resumed agent session"
        );
        agent
    }

    pub fn with_observer(mut self, observer: Box<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the usage ledger, e.g. to price with a custom table
    pub fn with_ledger(mut self, ledger: UsageLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Share an interrupt flag with the caller (e.g. a Ctrl-C handler)
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Start a fresh run. Any previous conversation and turn log are dropped.
    pub async fn run(&mut self, goal: impl Into<String>) -> Result<RunOutcome> {
        self.conversation = Conversation::new();
        self.turn_log.clear();
        self.conversation.push(Message::user(goal));
        self.drive().await
    }

    /// Continue the current conversation with a follow-up question
    pub async fn ask(&mut self, follow_up: impl Into<String>) -> Result<RunOutcome> {
        self.conversation.push(Message::user(follow_up));
        self.drive().await
    }

    pub fn turn_log(&self) -> &[TurnRecord] {
        &self.turn_log
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.ledger.export()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &str {
        self.adapter.name()
    }

    /// State to persist for a later [`AgentLoop::resume`]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            messages: self.conversation.clone(),
            turn_log: self.turn_log.clone(),
            usage: self.ledger.export(),
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        tracing::info!(
            model = %self.config.model,
            backend = %self.adapter.name(),
            stream = self.config.stream,
            max_turns = self.config.max_turns,
            messages = self.conversation.len(),
            "agent loop start"
        );

        for _ in 0..self.config.max_turns {
            if self.interrupt.take() {
                return Ok(self.finish(RunOutcome::Interrupted, AgentState::Interrupted));
            }

            let turn = self.turn_log.len() + 1;
            self.state = AgentState::Thinking;
            self.observer.on_turn_start(turn, self.config.max_turns);
            tracing::debug!(turn, messages = self.conversation.len(), "starting model turn");

            let response = match self.await_response().await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    self.interrupt.take();
                    return Ok(self.finish(RunOutcome::Interrupted, AgentState::Interrupted));
                }
                Err(err) => {
                    self.state = AgentState::Failed;
                    tracing::warn!(turn, error = %err, "agent loop failed");
                    return Err(err);
                }
            };

            self.ledger.observe(response.usage);
            self.state = AgentState::Responding;

            let stop_reason = response.stop_reason;
            let message = response.message;
            let text = message.text();
            let calls: Vec<(String, String, Value)> = message
                .tool_calls()
                .into_iter()
                .map(|c| {
                    (
                        c.call_id.to_string(),
                        c.tool_name.to_string(),
                        c.arguments.clone(),
                    )
                })
                .collect();
            self.conversation.push(message);

            tracing::debug!(turn, tool_calls = calls.len(), ?stop_reason, "received model response");

            if !self.config.stream && !text.is_empty() {
                self.observer.on_text(&text);
            }

            if calls.is_empty() && stop_reason.map_or(true, StopReason::is_completion) {
                self.turn_log.push(TurnRecord {
                    turn,
                    text: text.clone(),
                    tool_calls: Vec::new(),
                });
                return Ok(self.finish(RunOutcome::Completed(text), AgentState::Done));
            }

            self.state = AgentState::ExecutingTools;
            let mut results = Vec::with_capacity(calls.len());
            let mut records = Vec::with_capacity(calls.len());
            for (call_id, name, input) in calls {
                self.observer.on_tool_call(&name, &input);
                let output = self.execute_tool(&name, input.clone()).await;
                let output = truncate_result(output, self.config.truncation_limit);
                self.observer.on_tool_result(&name, &output);
                let recorded_name = self.tools.resolve(&name).unwrap_or(&name).to_string();
                records.push(ToolCallRecord {
                    name: recorded_name,
                    input,
                    result: preview(&output),
                });
                results.push(ContentPart::tool_result(call_id, output));
            }

            self.turn_log.push(TurnRecord {
                turn,
                text,
                tool_calls: records,
            });
            if !results.is_empty() {
                self.conversation.push(Message::tool_results(results));
            }
        }

        Ok(self.finish(RunOutcome::TimedOut, AgentState::TimedOut))
    }

    /// Send one request, racing it against an interrupt. `None` means interrupted.
    async fn await_response(&mut self) -> Result<Option<CompletionResponse>> {
        let request = CompletionRequest::new(
            self.config.model.clone(),
            self.conversation.messages().to_vec(),
        )
        .with_system(self.config.system_prompt.clone())
        .with_max_tokens(self.config.max_tokens)
        .with_tools(self.tools.definitions());

        let adapter = self.adapter.clone();
        let interrupt = self.interrupt.clone();
        let observer = self.observer.as_mut();
        let stream = self.config.stream;

        tokio::select! {
            biased;
            _ = interrupt.requested() => {
                tracing::info!("interrupted while awaiting backend response");
                Ok(None)
            }
            response = request_turn(adapter.as_ref(), request, stream, observer) => {
                response.map(Some).map_err(|e| e.with_backend(adapter.name()))
            }
        }
    }

    async fn execute_tool(&self, name: &str, input: Value) -> String {
        let size = serde_json::to_string(&input).map(|s| s.len()).unwrap_or(0);
        if size > self.config.max_tool_argument_bytes {
            tracing::warn!(tool = %name, size, "refusing oversized tool arguments");
            return error_payload(&format!(
                "ArgumentsTooLarge: arguments for {name} are {size} bytes, limit is {}",
                self.config.max_tool_argument_bytes
            ));
        }
        self.tools.dispatch(name, input).await
    }

    fn finish(&mut self, outcome: RunOutcome, state: AgentState) -> RunOutcome {
        self.state = state;
        tracing::info!(
            ?state,
            turns = self.turn_log.len(),
            total_tokens = self.ledger.total_tokens(),
            "agent loop finished"
        );
        self.observer.on_finished(&outcome);
        outcome
    }
}

/// One request/response cycle, streamed or not
async fn request_turn(
    adapter: &dyn ProtocolAdapter,
    request: CompletionRequest,
    stream: bool,
    observer: &mut dyn AgentObserver,
) -> Result<CompletionResponse> {
    if !stream {
        return adapter.complete(request).await;
    }
    let events = adapter.complete_stream(request).await?;
    let assembler =
        StreamAssembler::new().with_call_id_ordering(adapter.orders_streamed_calls_by_id());
    collect_stream_with(events, assembler, |event| {
        if let StreamEvent::ContentBlockDelta {
            delta: ContentDelta::Text { text },
            ..
        } = event
        {
            observer.on_text_delta(text);
        }
    })
    .await
}
