use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::{ToolCallRequest, ToolDefinition};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: total_tokens.or(match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            }),
        }
    }
}

/// What a model produced for one `call_tool` request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

impl ModelResponse {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, request: ToolCallRequest) -> Self {
        self.tool_calls.push(request);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The text content, ignoring an empty string
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.text_content().is_none() && !self.has_tool_calls()
    }
}

/// Base trait for model vendors (OpenAI, Anthropic, Google)
///
/// Implementations translate the unified message and tool shapes into the vendor wire format
/// and back. Transport, auth and rate-limit failures are returned as errors, never folded
/// into a successful response.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short vendor name used in logs
    fn name(&self) -> &str;

    /// Single-shot completion of `prompt` with an optional system prompt
    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Ask the model for its next step given the conversation so far and the available tools.
    ///
    /// A leading `system` message in `messages` carries the system prompt.
    async fn call_tool(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));

        let derived = Usage::new(Some(7), Some(5), None);
        assert_eq!(derived.total_tokens, Some(12));
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));

        Ok(())
    }

    #[test]
    fn test_model_response_emptiness() {
        assert!(ModelResponse::default().is_empty());
        assert!(ModelResponse::text("").is_empty());
        assert!(!ModelResponse::text("Hi").is_empty());

        let call = ModelResponse::default().with_tool_call(ToolCallRequest::from_value(
            "1",
            "get_forecast",
            json!({}),
        ));
        assert!(!call.is_empty());
        assert!(call.text_content().is_none());
    }
}
