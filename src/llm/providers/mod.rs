// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Backend protocol adapters

pub mod anthropic;
pub(crate) mod common;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

/// Conversation generators shared by the adapter round-trip properties
#[cfg(test)]
pub(crate) mod test_support {
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    use crate::llm::message::{ContentPart, Message};

    fn arguments_strategy() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(
            "[a-z_]{1,8}",
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                "[ -~]{0,12}".prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
            ],
            0..4,
        )
        .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>()))
    }

    /// One user turn, the assistant reply, and the results of any tool
    /// calls the reply made. Call ids are unique within the exchange and
    /// carry the exchange number so they stay unique across the run.
    fn exchange_strategy(exchange: usize) -> impl Strategy<Value = Vec<Message>> {
        (
            "[ -~]{0,40}",
            prop::option::of("[ -~]{1,40}"),
            prop::collection::vec(("[a-z_]{1,16}", arguments_strategy()), 0..4),
            "[ -~]{0,40}",
        )
            .prop_map(move |(user, text, calls, result)| {
                let mut messages = vec![Message::user(user)];

                let mut parts: Vec<ContentPart> = text.into_iter().map(ContentPart::text).collect();
                let ids: Vec<String> = (0..calls.len())
                    .map(|i| format!("call_{exchange}_{i}"))
                    .collect();
                for (id, (name, arguments)) in ids.iter().zip(calls) {
                    parts.push(ContentPart::tool_call(id.clone(), name, arguments));
                }
                messages.push(Message::assistant_parts(parts));

                if !ids.is_empty() {
                    messages.push(Message::tool_results(
                        ids.iter()
                            .map(|id| ContentPart::tool_result(id.clone(), result.clone()))
                            .collect(),
                    ));
                }
                messages
            })
    }

    /// Conversations in the canonical shape both protocols can carry exactly
    pub(crate) fn conversation_strategy() -> impl Strategy<Value = Vec<Message>> {
        (0usize..4)
            .prop_flat_map(|count| {
                (0..count)
                    .map(exchange_strategy)
                    .collect::<Vec<_>>()
            })
            .prop_map(|exchanges| exchanges.into_iter().flatten().collect())
    }
}
