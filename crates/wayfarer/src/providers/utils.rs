use anyhow::{anyhow, Result};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::warn;

use super::base::{ModelResponse, Usage};
use crate::models::message::{Attachment, Message};
use crate::models::role::Role;
use crate::models::tool::{ToolCallRequest, ToolDefinition};

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ImageFormat {
    OpenAi,
    Anthropic,
}

/// Map a vendor HTTP response to its json body, or a descriptive error
pub async fn handle_response(vendor: &str, response: Response) -> Result<Value> {
    match response.status() {
        StatusCode::OK => Ok(response.json().await?),
        StatusCode::TOO_MANY_REQUESTS => Err(anyhow!("{} rate limit exceeded (429)", vendor)),
        status if status.is_server_error() => Err(anyhow!("{} server error: {}", vendor, status)),
        status => {
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "{} request failed: {} - {}",
                vendor,
                status,
                error_text
            ))
        }
    }
}

/// Convert unified messages to the OpenAI chat specification.
///
/// The system message stays an ordinary message, tool results keep their native `tool` role.
pub fn messages_to_openai_spec(messages: &[Message], image_format: &ImageFormat) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::Tool => {
                messages_spec.push(json!({
                    "role": "tool",
                    "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content.clone().unwrap_or_default(),
                }));
            }
            Role::Assistant => {
                let mut converted = json!({
                    "role": "assistant",
                    "content": message.text(),
                });
                if message.has_tool_calls() {
                    let tool_calls: Vec<Value> = message
                        .tool_calls()
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": Value::Object(call.arguments.clone()).to_string(),
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
                messages_spec.push(converted);
            }
            Role::System | Role::User => {
                let images: Vec<&Attachment> =
                    message.attachments.iter().filter(|a| a.is_image()).collect();
                skip_unsupported(message, "openai");

                let content = if images.is_empty() {
                    json!(message.content.clone().unwrap_or_default())
                } else {
                    let mut parts = Vec::new();
                    if let Some(text) = message.text() {
                        parts.push(json!({"type": "text", "text": text}));
                    }
                    parts.extend(images.iter().map(|image| convert_image(image, image_format)));
                    json!(parts)
                };
                messages_spec.push(json!({
                    "role": message.role,
                    "content": content,
                }));
            }
        }
    }

    messages_spec
}

/// Warn about attachments no vendor image block can carry
pub fn skip_unsupported(message: &Message, vendor: &str) {
    for attachment in message.attachments.iter().filter(|a| !a.is_image()) {
        warn!(
            vendor,
            mime_type = %attachment.mime_type,
            "dropping attachment the vendor cannot receive inline"
        );
    }
}

/// Convert an image attachment into an image json based on format
pub fn convert_image(image: &Attachment, image_format: &ImageFormat) -> Value {
    match image_format {
        ImageFormat::OpenAi => json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", image.mime_type, image.base64())
            }
        }),
        ImageFormat::Anthropic => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": image.base64(),
            }
        }),
    }
}

/// Convert tool definitions to OpenAI's function specification
pub fn tools_to_openai_spec(tools: &[ToolDefinition]) -> Result<Vec<Value>> {
    ensure_unique_names(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect())
}

pub fn ensure_unique_names(tools: &[ToolDefinition]) -> Result<()> {
    let mut tool_names = HashSet::new();
    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
    }
    Ok(())
}

/// Convert an OpenAI chat completion into a model response.
///
/// Tool arguments arrive as a json-encoded string; an undecodable argument string is an
/// error for the whole response.
pub fn openai_response_to_message(response: &Value) -> Result<ModelResponse> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No choices in OpenAI response: {}", response))?;

    let mut result = ModelResponse {
        content: original
            .get("content")
            .and_then(|c| c.as_str())
            .map(String::from),
        ..Default::default()
    };

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .ok_or_else(|| anyhow!("Tool call {} has no function name", id))?;
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or("{}");

            let params = serde_json::from_str::<Value>(arguments).map_err(|e| {
                anyhow!(
                    "Could not interpret tool use parameters for id {}: {}",
                    id,
                    e
                )
            })?;
            result.tool_calls.push(ToolCallRequest::from_value(
                id,
                function_name,
                params,
            ));
        }
    }

    result.usage = openai_usage(response);
    Ok(result)
}

fn openai_usage(data: &Value) -> Option<Usage> {
    let usage = data.get("usage")?;
    let tokens = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);
    Some(Usage::new(
        tokens("prompt_tokens"),
        tokens("completion_tokens"),
        tokens("total_tokens"),
    ))
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
