use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use wayfarer::models::message::Message;
use wayfarer::models::tool::ToolDefinition;
use wayfarer::orchestrator::{AgentConfig, RetryPolicy};
use wayfarer::providers::{ModelResponse, Provider};
use wayfarer::tools::ToolRegistry;

use crate::state::AppState;

/// Replays canned responses, then answers with plain text
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(prompt.to_string())
    }

    async fn call_tool(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ModelResponse::text("done")))
    }
}

pub fn app_state(provider: Arc<ScriptedProvider>, tools: ToolRegistry) -> AppState {
    let agent = AgentConfig {
        model_retry: RetryPolicy::none(),
        tool_retry: RetryPolicy::none(),
        ..AgentConfig::default()
    };
    AppState::new(provider, Arc::new(tools), agent)
}
