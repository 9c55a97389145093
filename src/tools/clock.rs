//! Current date and time, so questions about "today" have an anchor

use super::{Tool, ToolContext, ToolError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub struct CurrentDateTimeTool;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClockInput {
    /// Fixed offset from UTC in minutes; local time when absent
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
}

fn describe(now: DateTime<FixedOffset>) -> String {
    format!(
        "{} ({}), {} UTC{}",
        now.format("%Y-%m-%d"),
        now.format("%A"),
        now.format("%H:%M"),
        now.format("%:z")
    )
}

#[async_trait]
impl Tool for CurrentDateTimeTool {
    fn name(&self) -> &str {
        "current_datetime"
    }

    fn description(&self) -> String {
        "Get the current date, weekday and time. Use before answering questions about today, tomorrow, or this week.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_minutes": {
                    "type": "integer",
                    "description": "Offset from UTC in minutes, e.g. -300 for UTC-5. Defaults to server local time."
                }
            }
        })
    }

    async fn run(&self, input: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        let input: ClockInput = serde_json::from_value(Value::Object(input))
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let now = match input.utc_offset_minutes {
            Some(minutes) => {
                let offset = FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                    ToolError::InvalidInput(format!("offset out of range: {minutes}"))
                })?;
                chrono::Utc::now().with_timezone(&offset)
            }
            None => Local::now().fixed_offset(),
        };

        Ok(describe(now))
    }
}
