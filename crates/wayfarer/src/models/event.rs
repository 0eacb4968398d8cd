use super::tool::{Arguments, ToolCallResult};
use serde::{Deserialize, Serialize};

/// One unit of the orchestrator's output stream, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message {
        text: String,
    },
    ToolCall {
        name: String,
        arguments: Arguments,
    },
    ToolResult {
        name: String,
        text: String,
        is_error: bool,
    },
    Error {
        text: String,
    },
}

impl Event {
    pub fn message<S: Into<String>>(text: S) -> Self {
        Event::Message { text: text.into() }
    }

    pub fn tool_call<S: Into<String>>(name: S, arguments: Arguments) -> Self {
        Event::ToolCall {
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result<S: Into<String>>(name: S, result: &ToolCallResult) -> Self {
        Event::ToolResult {
            name: name.into(),
            text: result.text.clone(),
            is_error: result.is_error,
        }
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Event::Error { text: text.into() }
    }

    /// Render the event as a single newline-terminated json line
    pub fn to_ndjson(&self) -> String {
        // An enum of strings, bools and json maps always serializes
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}
