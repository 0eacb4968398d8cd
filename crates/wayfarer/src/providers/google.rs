use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::base::{ModelResponse, Provider, Usage};
use super::configs::GoogleProviderConfig;
use super::utils::{ensure_unique_names, handle_response};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{ToolCallRequest, ToolDefinition};

/// Returned in place of an empty candidate so the conversation always gets an answer
pub const EMPTY_RESPONSE_TEXT: &str =
    "I apologize, but I couldn't generate a proper response. Please try rephrasing your question.";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// A model bound to a system instruction. Gemini fixes the instruction per model instance,
/// so a new binding is created whenever it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerativeModel {
    pub model_name: String,
    pub system_instruction: Option<String>,
}

impl GenerativeModel {
    pub fn new<S: Into<String>>(model_name: S, system_instruction: Option<String>) -> Self {
        Self {
            model_name: model_name.into(),
            system_instruction,
        }
    }

    fn endpoint(&self, host: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            host.trim_end_matches('/'),
            self.model_name
        )
    }
}

pub struct GoogleProvider {
    client: Client,
    config: GoogleProviderConfig,
    model: Mutex<GenerativeModel>,
}

impl GoogleProvider {
    pub fn new(config: GoogleProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;
        let model = Mutex::new(GenerativeModel::new(config.model.clone(), None));

        Ok(Self {
            client,
            config,
            model,
        })
    }

    /// The current binding, replaced first if the system instruction differs
    pub fn bind(&self, system_instruction: Option<String>) -> GenerativeModel {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        if model.system_instruction != system_instruction {
            debug!(model = %model.model_name, "system instruction changed, rebinding model");
            *model = GenerativeModel::new(model.model_name.clone(), system_instruction);
        }
        model.clone()
    }

    fn payload(&self, model: &GenerativeModel, contents: Vec<Value>, tools: Option<Value>) -> Value {
        let safety_settings: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_NONE"}))
            .collect();

        let mut payload = json!({
            "contents": contents,
            "safetySettings": safety_settings,
        });
        if let Some(instruction) = &model.system_instruction {
            payload["systemInstruction"] = json!({"parts": [{"text": instruction}]});
        }
        if let Some(tools) = tools {
            payload["tools"] = json!([tools]);
        }

        let mut generation_config = Map::new();
        if let Some(temp) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }
        payload
    }

    async fn post(&self, model: &GenerativeModel, payload: Value) -> Result<Value> {
        let response = self
            .client
            .post(model.endpoint(&self.config.host))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let body = handle_response("Google", response).await?;
        if let Some(error) = body.get("error") {
            return Err(anyhow!("Google API error: {}", error));
        }
        Ok(body)
    }
}

fn push_turn(contents: &mut Vec<Value>, role: &str, mut parts: Vec<Value>) {
    if parts.is_empty() {
        parts.push(json!({"text": " "}));
    }
    if let Some(last) = contents.last_mut() {
        if last["role"] == role {
            if let Some(existing) = last["parts"].as_array_mut() {
                existing.extend(parts);
                return;
            }
        }
    }
    contents.push(json!({"role": role, "parts": parts}));
}

/// Convert unified messages to Gemini contents, returning the system instruction separately.
///
/// Gemini only knows `user` and `model` turns and requires them to alternate: tool results
/// become `user` parts, and consecutive parts of the same role are merged into one turn.
pub fn messages_to_google_spec(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if let Some(text) = message.text() {
                    system_parts.push(text);
                }
            }
            Role::Tool => {
                let part = json!({
                    "functionResponse": {
                        "name": message.tool_name.clone().unwrap_or_default(),
                        "response": {"result": message.content.clone().unwrap_or_default()},
                    }
                });
                push_turn(&mut contents, "user", vec![part]);
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                if let Some(text) = message.text() {
                    parts.push(json!({"text": text}));
                }
                for call in message.tool_calls() {
                    parts.push(json!({
                        "functionCall": {"name": call.name, "args": call.arguments}
                    }));
                }
                push_turn(&mut contents, "model", parts);
            }
            Role::User => {
                let mut parts: Vec<Value> = message
                    .attachments
                    .iter()
                    .map(|attachment| {
                        json!({
                            "inlineData": {
                                "mimeType": attachment.mime_type,
                                "data": attachment.base64(),
                            }
                        })
                    })
                    .collect();
                if let Some(text) = message.text() {
                    parts.push(json!({"text": text}));
                }
                push_turn(&mut contents, "user", parts);
            }
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, contents)
}

fn google_schema_type(json_type: &str) -> String {
    json_type.to_uppercase()
}

/// Convert tool definitions to a single Gemini tool holding every function declaration
pub fn tools_to_google_spec(tools: &[ToolDefinition]) -> Result<Option<Value>> {
    ensure_unique_names(tools)?;
    if tools.is_empty() {
        return Ok(None);
    }

    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let mut declaration = json!({
                "name": tool.name,
                "description": tool.description,
            });

            let properties: Map<String, Value> = tool
                .parameters
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, prop)| {
                            let json_type = prop.get("type").and_then(|t| t.as_str()).unwrap_or("string");
                            let mut schema = json!({"type": google_schema_type(json_type)});
                            if let Some(description) = prop.get("description") {
                                schema["description"] = description.clone();
                            }
                            if json_type == "array" {
                                schema["items"] = json!({"type": "STRING"});
                            }
                            (name.clone(), schema)
                        })
                        .collect()
                })
                .unwrap_or_default();

            // Gemini rejects OBJECT parameters without properties
            if !properties.is_empty() {
                declaration["parameters"] = json!({
                    "type": "OBJECT",
                    "properties": properties,
                    "required": tool.parameters.get("required").cloned().unwrap_or(json!([])),
                });
            }
            declaration
        })
        .collect();

    Ok(Some(json!({"functionDeclarations": declarations})))
}

/// Decode the first candidate. Gemini does not identify function calls, so ids are
/// synthesized per response as `gemini_tc_1`, `gemini_tc_2`, and so on.
pub fn google_response_to_message(response: &Value) -> Result<ModelResponse> {
    let parts = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array())
        .cloned()
        .unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in &parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| anyhow!("functionCall without a name: {}", call))?;
            let id = format!("gemini_tc_{}", tool_calls.len() + 1);
            tool_calls.push(ToolCallRequest::from_value(
                id,
                name,
                call.get("args").cloned().unwrap_or(Value::Null),
            ));
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        text = EMPTY_RESPONSE_TEXT.to_string();
    }

    let usage = response.get("usageMetadata").map(|usage| {
        let tokens = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);
        Usage::new(
            tokens("promptTokenCount"),
            tokens("candidatesTokenCount"),
            tokens("totalTokenCount"),
        )
    });

    Ok(ModelResponse {
        content: Some(text),
        tool_calls,
        usage,
    })
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let model = GenerativeModel::new(self.config.model.clone(), system.map(String::from));
        let contents = vec![json!({"role": "user", "parts": [{"text": prompt}]})];
        let response = self.post(&model, self.payload(&model, contents, None)).await?;
        Ok(google_response_to_message(&response)?
            .content
            .unwrap_or_default())
    }

    async fn call_tool(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        let (system, contents) = messages_to_google_spec(messages);
        if contents.is_empty() {
            return Err(anyhow!("No message content to send"));
        }
        let tools_spec = tools_to_google_spec(tools)?;
        let model = self.bind(system);

        let response = self
            .post(&model, self.payload(&model, contents, tools_spec))
            .await?;
        let message = google_response_to_message(&response)?;
        debug!(usage = ?message.usage, tool_calls = message.tool_calls.len(), "google response");
        Ok(message)
    }
}
