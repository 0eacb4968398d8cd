use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::ToolDefinition;
use crate::providers::base::{ModelResponse, Provider};

/// A mock provider that replays pre-configured outcomes for testing
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<ModelResponse>>>>,
    fallback: Option<ModelResponse>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of outcomes
    pub fn new(responses: Vec<Result<ModelResponse>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            fallback: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer with `response` once the scripted outcomes run out
    pub fn repeating(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// How many times `call_tool` has been invoked
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The messages passed to each `call_tool` invocation
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
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
        match next {
            Some(outcome) => outcome,
            // Return an empty response if no more pre-configured responses
            None => Ok(self.fallback.clone().unwrap_or_default()),
        }
    }
}
