//! System prompt construction
//!
//! The prompt names the assistant's role, anchors the current date, and lists
//! the tools the model may call.

use crate::llm::ToolDefinition;
use chrono::{DateTime, TimeZone};
use std::fmt::Write;

/// Base system prompt establishing the assistant's role
const BASE_PROMPT: &str = r"You are a helpful personal assistant. You can answer questions directly, and you can act on the user's mail and calendar through tools when a request needs it.

Only call a tool when the answer depends on information or actions you do not already have. Call each tool at most once per request, then answer using its result. If a tool reports an error, tell the user plainly what failed.

Be concise.";

/// Build the system prompt for a generation request
pub fn build_system_prompt<Tz>(tools: &[ToolDefinition], now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut prompt = String::from(BASE_PROMPT);

    let _ = write!(
        prompt,
        "\n\nToday is {} ({}).",
        now.format("%Y-%m-%d"),
        now.format("%A")
    );

    if tools.is_empty() {
        prompt.push_str("\n\nNo tools are available; answer from your own knowledge.");
    } else {
        prompt.push_str("\n\nAvailable tools:");
        for tool in tools {
            let _ = write!(prompt, "\n- {}: {}", tool.name, first_line(&tool.description));
        }
    }

    prompt
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}
