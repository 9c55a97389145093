//! Folds streamed deltas into one logical assistant turn

use super::types::{GenerationDelta, ToolCallFragment};
use crate::transcript::{AssistantTurn, ToolRequest};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// The stream completed without text or tool requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("generation produced no content")]
pub struct EmptyGeneration;

/// Tool call being assembled from fragments sharing one index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    /// `id` and `name` are atomic: the first non-empty value wins.
    /// `arguments` arrive as raw JSON text split at arbitrary points.
    fn merge(&mut self, fragment: &ToolCallFragment) {
        if let Some(id) = fragment.id.as_deref() {
            if self.id.is_empty() && !id.is_empty() {
                self.id = id.to_string();
            }
        }
        if let Some(name) = fragment.name.as_deref() {
            if self.name.is_empty() && !name.is_empty() {
                self.name = name.to_string();
            }
        }
        if let Some(arguments) = fragment.arguments.as_deref() {
            self.arguments.push_str(arguments);
        }
    }

    /// A fragment carrying a different id starts another call
    fn is_other_call(&self, fragment: &ToolCallFragment) -> bool {
        fragment
            .id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && !self.id.is_empty() && id != self.id)
    }

    fn into_request(self, id: String) -> ToolRequest {
        let arguments = parse_arguments(&self.name, &self.arguments);
        ToolRequest::new(id, self.name, arguments)
    }
}

/// `call_<index>`, suffixed until it clashes with no id in `taken`
fn synthesize_id(index: u32, taken: &HashSet<String>) -> String {
    let base = format!("call_{index}");
    std::iter::once(base.clone())
        .chain((1u32..).map(|n| format!("{base}_{n}")))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

fn parse_arguments(tool_name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(tool = %tool_name, arguments = %other, "Tool arguments are not a JSON object");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(tool = %tool_name, error = %e, arguments = %raw, "Failed to parse tool arguments");
            Map::new()
        }
    }
}

/// Accumulates deltas of a single generation
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    /// Calls in arrival order
    calls: Vec<PartialToolCall>,
    /// Index -> position in `calls` of the call receiving that index's fragments
    open: HashMap<u32, usize>,
    deltas: usize,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &GenerationDelta) {
        self.deltas += 1;
        self.text.push_str(&delta.text);
        for fragment in &delta.tool_calls {
            let open = self.open.get(&fragment.index).copied();
            let slot = match open {
                Some(slot) if !self.calls[slot].is_other_call(fragment) => slot,
                _ => {
                    self.calls.push(PartialToolCall {
                        index: fragment.index,
                        ..PartialToolCall::default()
                    });
                    self.open.insert(fragment.index, self.calls.len() - 1);
                    self.calls.len() - 1
                }
            };
            self.calls[slot].merge(fragment);
        }
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Merged tool requests, ordered by call index, then arrival.
    ///
    /// Calls without a name are dropped. Missing ids are synthesized so that
    /// every id in the turn is distinct.
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        let mut calls: Vec<&PartialToolCall> = self
            .calls
            .iter()
            .filter(|call| {
                if call.name.is_empty() {
                    tracing::warn!(index = call.index, "Dropping tool call without a name");
                }
                !call.name.is_empty()
            })
            .collect();
        calls.sort_by_key(|call| call.index);

        let mut taken: HashSet<String> = calls
            .iter()
            .filter(|call| !call.id.is_empty())
            .map(|call| call.id.clone())
            .collect();

        calls
            .into_iter()
            .map(|call| {
                let id = if call.id.is_empty() {
                    let id = synthesize_id(call.index, &taken);
                    taken.insert(id.clone());
                    id
                } else {
                    call.id.clone()
                };
                call.clone().into_request(id)
            })
            .collect()
    }

    /// Close the generation into an assistant turn
    pub fn finish(self, message_id: impl Into<String>) -> Result<AssistantTurn, EmptyGeneration> {
        let tool_requests = self.tool_requests();
        if self.text.is_empty() && tool_requests.is_empty() {
            return Err(EmptyGeneration);
        }
        Ok(AssistantTurn {
            message_id: message_id.into(),
            text: self.text,
            tool_requests,
        })
    }
}
