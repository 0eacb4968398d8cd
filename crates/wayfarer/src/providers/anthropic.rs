use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{ModelResponse, Provider, Usage};
use super::configs::AnthropicProviderConfig;
use super::utils::{convert_image, ensure_unique_names, handle_response, skip_unsupported, ImageFormat};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{ToolCallRequest, ToolDefinition};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: i32 = 1024;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Option<Usage> {
        let usage = data.get("usage")?;
        let tokens = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);
        Some(Usage::new(
            tokens("input_tokens"),
            tokens("output_tokens"),
            None,
        ))
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        let body = handle_response("Anthropic", response).await?;
        if body.get("type").and_then(|t| t.as_str()) == Some("error") {
            return Err(anyhow!("Anthropic API error: {}", body["error"]));
        }
        Ok(body)
    }

    fn payload(&self, system: Option<String>, messages: Vec<Value>, tools: Vec<Value>) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = system {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        payload
    }
}

/// Split unified messages into the top-level system prompt and Anthropic content blocks.
///
/// Tool results are sent as `user` turns carrying a `tool_result` block. Anthropic rejects
/// empty block lists, so turns with nothing to say are left out.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut anthropic_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if let Some(text) = message.text() {
                    system_parts.push(text);
                }
            }
            Role::Tool => {
                anthropic_messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                        "content": message.content.clone().unwrap_or_default(),
                    }]
                }));
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if let Some(text) = message.text() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                for call in message.tool_calls() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                if blocks.is_empty() {
                    continue;
                }
                anthropic_messages.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::User => {
                skip_unsupported(message, "anthropic");
                let mut blocks: Vec<Value> = message
                    .attachments
                    .iter()
                    .filter(|a| a.is_image())
                    .map(|image| convert_image(image, &ImageFormat::Anthropic))
                    .collect();
                if let Some(text) = message.text() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                if blocks.is_empty() {
                    continue;
                }
                anthropic_messages.push(json!({"role": "user", "content": blocks}));
            }
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, anthropic_messages)
}

pub fn tools_to_anthropic_spec(tools: &[ToolDefinition]) -> Result<Vec<Value>> {
    ensure_unique_names(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            })
        })
        .collect())
}

/// Concatenate the text blocks and collect the tool-use blocks, whose input is already an object
pub fn anthropic_response_to_message(response: &Value) -> Result<ModelResponse> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API: {}", response))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default();
                let name = block["name"]
                    .as_str()
                    .ok_or_else(|| anyhow!("tool_use block {} has no name", id))?;
                tool_calls.push(ToolCallRequest::from_value(
                    id,
                    name,
                    block.get("input").cloned().unwrap_or(Value::Null),
                ));
            }
            _ => {}
        }
    }

    Ok(ModelResponse {
        content: Some(text),
        tool_calls,
        usage: AnthropicProvider::get_usage(response),
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let messages = vec![json!({"role": "user", "content": prompt})];
        let payload = self.payload(system.map(String::from), messages, vec![]);
        let response = self.post(payload).await?;
        Ok(anthropic_response_to_message(&response)?
            .content
            .unwrap_or_default())
    }

    async fn call_tool(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        let (system, anthropic_messages) = messages_to_anthropic_spec(messages);
        let tools_spec = tools_to_anthropic_spec(tools)?;

        let response = self
            .post(self.payload(system, anthropic_messages, tools_spec))
            .await?;
        let message = anthropic_response_to_message(&response)?;
        debug!(usage = ?message.usage, tool_calls = message.tool_calls.len(), "anthropic response");
        Ok(message)
    }
}
