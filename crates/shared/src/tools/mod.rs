pub mod reminder;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::llm::ToolDefinition;
use crate::models::TurnContext;

pub const SCHEDULE_REMINDER_TOOL_NAME: &str = "schedule_reminder";

/// The closed set of capabilities the agent may invoke mid-generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    ScheduleReminder {
        datetime_phrase: String,
        reminder_content: String,
    },
}

#[derive(Debug, Error)]
pub enum ToolParseError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

#[derive(Debug, Deserialize)]
struct ScheduleReminderArgs {
    datetime_phrase: String,
    reminder_content: String,
}

impl ToolInvocation {
    /// Decodes a provider tool call (name + JSON argument string) into a
    /// typed invocation.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolParseError> {
        match name {
            SCHEDULE_REMINDER_TOOL_NAME => {
                let args: ScheduleReminderArgs =
                    serde_json::from_str(arguments).map_err(|err| {
                        ToolParseError::InvalidArguments {
                            tool: name.to_string(),
                            message: err.to_string(),
                        }
                    })?;
                Ok(Self::ScheduleReminder {
                    datetime_phrase: args.datetime_phrase,
                    reminder_content: args.reminder_content,
                })
            }
            other => Err(ToolParseError::UnknownTool(other.to_string())),
        }
    }
}

/// Tool declarations advertised to the model on every generation call.
pub fn declared_tools() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: SCHEDULE_REMINDER_TOOL_NAME,
        description: "Schedules a reminder for the user at a future time. \
                      Use when the user asks to be reminded of something.",
        parameters: json!({
            "type": "object",
            "properties": {
                "datetime_phrase": {
                    "type": "string",
                    "description": "When the reminder should fire, as a natural language phrase like 'tomorrow at 9am'."
                },
                "reminder_content": {
                    "type": "string",
                    "description": "What to remind the user about."
                }
            },
            "required": ["datetime_phrase", "reminder_content"]
        }),
    }]
}

/// Runs a tool invocation against the turn context. Tools always return
/// text; failures are conversational, never errors.
pub fn execute(invocation: ToolInvocation, ctx: &mut TurnContext) -> String {
    match invocation {
        ToolInvocation::ScheduleReminder {
            datetime_phrase,
            reminder_content,
        } => reminder::invoke(ctx, &datetime_phrase, &reminder_content),
    }
}
