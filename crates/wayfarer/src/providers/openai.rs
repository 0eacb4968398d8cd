use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{ModelResponse, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, handle_response, messages_to_openai_spec,
    openai_response_to_message, tools_to_openai_spec, ImageFormat,
};
use crate::models::message::Message;
use crate::models::tool::ToolDefinition;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        // Context overflows arrive as a 400 with a structured error body
        if response.status() == StatusCode::BAD_REQUEST {
            let error_text = response.text().await.unwrap_or_default();
            let overflow = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|body| check_openai_context_length_error(body.get("error")?));
            return match overflow {
                Some(err) => Err(err.into()),
                None => Err(anyhow!(
                    "OpenAI request failed: {} - {}",
                    StatusCode::BAD_REQUEST,
                    error_text
                )),
            };
        }

        let body = handle_response("OpenAI", response).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = body.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }
        Ok(body)
    }

    fn payload(&self, messages: Vec<Value>, tools: Vec<Value>) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        payload
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let response = self.post(self.payload(messages, vec![])).await?;
        Ok(openai_response_to_message(&response)?
            .content
            .unwrap_or_default())
    }

    async fn call_tool(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        let messages_spec = messages_to_openai_spec(messages, &ImageFormat::OpenAi);
        let tools_spec = tools_to_openai_spec(tools)?;

        let response = self.post(self.payload(messages_spec, tools_spec)).await?;
        let message = openai_response_to_message(&response)?;
        debug!(usage = ?message.usage, tool_calls = message.tool_calls.len(), "openai response");
        Ok(message)
    }
}
