use chrono::Local;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::ConversationLog;
use crate::models::event::Event;
use crate::models::message::{Attachment, Message};
use crate::models::tool::{ToolCallRequest, ToolCallResult, ToolDefinition};
use crate::prompt_template::system_prompt;
use crate::providers::base::{ModelResponse, Provider};
use crate::tools::registry::{to_call_result, ToolRegistry};

/// Text of the error event emitted when the model cannot be reached
pub const MODEL_FAILURE_PREFIX: &str = "I'm having trouble connecting to my brain right now.";

/// Hard ceiling on model calls per run
pub const MAX_TURNS: usize = 10;

/// Recorded in the log for tool calls a cancelled run never executed
pub const CANCELLED_TOOL_TEXT: &str = "Tool call cancelled before it ran";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every failed attempt
    Fixed,
    /// The base delay multiplied by the attempt number
    Linear,
}

/// How many times an operation is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// A single attempt with no waiting
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Wait after the given failed attempt, counting from 1
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay * attempt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Upper bound on model turns in one run, between 1 and [`MAX_TURNS`]
    pub max_turns: usize,
    pub model_retry: RetryPolicy,
    pub tool_retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            model_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
            tool_retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        }
    }
}

/// Why the last run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting tools
    Done,
    /// The model could not be reached after all retries
    Error,
    /// The turn limit was hit while tools were still being requested
    TurnLimit,
    Cancelled,
}

/// What the user sent for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl UserInput {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment<S: Into<String>>(mut self, mime_type: S, data: Vec<u8>) -> Self {
        self.attachment = Some(Attachment::new(mime_type, data));
        self
    }

    /// Build the user message. Text documents are inlined between delimiters, anything else
    /// (images) rides along as an attachment for the vendor to handle.
    pub fn into_message(self) -> Message {
        match self.attachment {
            Some(attachment) if is_text_document(&attachment.mime_type) => {
                let content = String::from_utf8_lossy(&attachment.data);
                debug!(
                    mime_type = %attachment.mime_type,
                    chars = content.len(),
                    "inlining attached document"
                );
                Message::user().with_text(inline_document(&self.text, &content))
            }
            Some(attachment) => Message::user()
                .with_text(self.text)
                .with_attachment(attachment.mime_type, attachment.data),
            None => Message::user().with_text(self.text),
        }
    }
}

impl From<&str> for UserInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for UserInput {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

fn is_text_document(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || mime_type == "application/json"
}

fn inline_document(question: &str, content: &str) -> String {
    format!(
        "{question}\n\n\
         ----- [ATTACHED DOCUMENT START] -----\n\
         The user attached the document below. It may be written in another language; \
         answer in the language of the user's question above.\n\n\
         CONTENT:\n{content}\n\
         ----- [ATTACHED DOCUMENT END] -----\n"
    )
}

enum Failure<E> {
    Cancelled,
    Exhausted(E),
}

/// Drives one conversation: asks the model, runs the tools it requests and records every
/// step in the conversation log.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    log: ConversationLog,
    config: AgentConfig,
    last_stop: Option<StopReason>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.len())
            .field("messages", &self.log.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            log: ConversationLog::new(),
            config: AgentConfig::default(),
            last_stop: None,
        }
    }

    /// Continue an existing conversation
    pub fn with_log(mut self, log: ConversationLog) -> Self {
        self.log = log;
        self
    }

    /// Use `config`, keeping the turn cap within `1..=MAX_TURNS`
    pub fn with_config(mut self, mut config: AgentConfig) -> Self {
        let max_turns = config.max_turns.clamp(1, MAX_TURNS);
        if max_turns != config.max_turns {
            warn!(
                requested = config.max_turns,
                max_turns, "turn cap out of range, clamping"
            );
            config.max_turns = max_turns;
        }
        self.config = config;
        self
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn into_log(self) -> ConversationLog {
        self.log
    }

    /// Forget the conversation so far
    pub fn reset(&mut self) {
        self.log.clear();
        self.last_stop = None;
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }

    /// Run one user turn to completion, yielding events as they happen
    pub fn run<I: Into<UserInput>>(&mut self, input: I) -> BoxStream<'_, Event> {
        self.run_with_cancel(input, CancellationToken::new())
    }

    /// Like [`Orchestrator::run`], stopping early once `cancel` fires.
    ///
    /// Cancellation is checked before every model and tool call and interrupts retry waits.
    /// Tool calls of the interrupted turn that never ran are closed in the log with an error
    /// result so the conversation stays valid for the next run; no further events are emitted.
    pub fn run_with_cancel<I: Into<UserInput>>(
        &mut self,
        input: I,
        cancel: CancellationToken,
    ) -> BoxStream<'_, Event> {
        let input = input.into();
        Box::pin(async_stream::stream! {
            self.last_stop = None;
            self.log.append(input.into_message());

            let mut stop = StopReason::TurnLimit;
            'turns: for turn in 1..=self.config.max_turns {
                if cancel.is_cancelled() {
                    stop = StopReason::Cancelled;
                    break;
                }

                let tools = self.tools.list();
                let messages = self.request_messages(&tools);
                info!(turn, provider = self.provider.name(), "calling model");

                let response = match self.call_model(&messages, &tools, &cancel).await {
                    Ok(response) => response,
                    Err(Failure::Cancelled) => {
                        stop = StopReason::Cancelled;
                        break;
                    }
                    Err(Failure::Exhausted(err)) => {
                        yield Event::error(format!("{} Error: {}", MODEL_FAILURE_PREFIX, err));
                        stop = StopReason::Error;
                        break;
                    }
                };

                let reply = (!response.is_empty()).then(|| {
                    Message::assistant()
                        .with_optional_text(response.text_content().map(String::from))
                        .with_tool_calls(response.tool_calls.clone())
                });
                if let Some(text) = response.text_content() {
                    yield Event::message(text);
                }
                // Logged once its event is out, like tool results
                if let Some(reply) = reply {
                    self.log.append(reply);
                }

                if !response.has_tool_calls() {
                    stop = StopReason::Done;
                    break;
                }

                for (index, call) in response.tool_calls.iter().enumerate() {
                    if cancel.is_cancelled() {
                        self.close_pending(&response.tool_calls[index..]);
                        stop = StopReason::Cancelled;
                        break 'turns;
                    }

                    info!(turn, tool = %call.name, "executing tool");
                    yield Event::tool_call(call.name.clone(), call.arguments.clone());

                    let result = match self.call_tool(call, &cancel).await {
                        Ok(result) => result,
                        Err(_) => {
                            self.close_pending(&response.tool_calls[index..]);
                            stop = StopReason::Cancelled;
                            break 'turns;
                        }
                    };

                    debug!(tool = %call.name, is_error = result.is_error, "tool finished");
                    yield Event::tool_result(call.name.clone(), &result);
                    self.log.append(
                        Message::tool_result(call.id.clone(), call.name.clone()).with_text(result.text),
                    );
                }
            }

            match stop {
                StopReason::TurnLimit => warn!(
                    max_turns = self.config.max_turns,
                    "turn limit reached with tool calls still pending"
                ),
                _ => info!(?stop, messages = self.log.len(), "run finished"),
            }
            self.last_stop = Some(stop);
        })
    }

    /// System prompt for this moment followed by the whole conversation
    fn request_messages(&self, tools: &[ToolDefinition]) -> Vec<Message> {
        let system = system_prompt(Local::now(), tools).unwrap_or_else(|err| {
            warn!(error = %err, "failed to render system prompt");
            String::new()
        });

        let mut messages = Vec::with_capacity(self.log.len() + 1);
        messages.push(Message::system().with_text(system));
        messages.extend_from_slice(self.log.messages());
        messages
    }

    async fn call_model(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, Failure<anyhow::Error>> {
        let policy = self.config.model_retry;
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Failure::Cancelled),
                outcome = self.provider.call_tool(messages, tools) => outcome,
            };

            match outcome {
                Ok(response) => {
                    debug!(usage = ?response.usage, "model responded");
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "model call failed"
                    );
                    if attempt >= policy.max_attempts {
                        return Err(Failure::Exhausted(err));
                    }
                    wait(policy.delay(attempt), cancel).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Dispatch one tool call, retrying handler failures but not unknown tools
    async fn call_tool(
        &self,
        call: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult, Failure<()>> {
        let policy = self.config.tool_retry;
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Failure::Cancelled),
                outcome = self.tools.call(&call.name, call.arguments.clone()) => outcome,
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    warn!(
                        tool = %call.name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "tool call failed"
                    );
                    wait(policy.delay(attempt), cancel).await?;
                    attempt += 1;
                }
                outcome => return Ok(to_call_result(&call.name, outcome)),
            }
        }
    }

    fn close_pending(&mut self, calls: &[ToolCallRequest]) {
        for call in calls {
            self.log.append(
                Message::tool_result(call.id.clone(), call.name.clone())
                    .with_text(CANCELLED_TOOL_TEXT),
            );
        }
    }
}

async fn wait<E>(delay: Duration, cancel: &CancellationToken) -> Result<(), Failure<E>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Failure::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::models::tool::Arguments;
    use crate::providers::mock::MockProvider;
    use crate::tools::schema::{ParamType, ToolSchema};
    use anyhow::anyhow;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest::from_value(id, name, arguments)
    }

    fn tool_turn(calls: Vec<ToolCallRequest>) -> ModelResponse {
        calls
            .into_iter()
            .fold(ModelResponse::default(), |response, c| response.with_tool_call(c))
    }

    /// Registry with a forecast tool that fails `failures` times before answering
    fn flaky_registry(failures: usize) -> (Arc<ToolRegistry>, Arc<AtomicUsize>) {
        let registry = ToolRegistry::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        registry.register(
            "get_forecast",
            "Weather forecast",
            ToolSchema::new().required("location", ParamType::String, "City"),
            move |_args: Arguments| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= failures {
                        Err(anyhow!("weather service timeout"))
                    } else {
                        Ok("Sunny, 24C")
                    }
                }
            },
        );
        (Arc::new(registry), attempts)
    }

    async fn collect(orchestrator: &mut Orchestrator, input: &str) -> Vec<Event> {
        orchestrator.run(input).collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_without_tools() {
        let provider = Arc::new(MockProvider::new(vec![Ok(ModelResponse::text(
            "Where would you like to fly from?",
        ))]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        let events = collect(&mut orchestrator, "find a flight").await;

        assert_eq!(
            events,
            vec![Event::message("Where would you like to fly from?")]
        );
        assert_eq!(orchestrator.log().len(), 2);
        assert_eq!(orchestrator.log().messages()[0].role, Role::User);
        assert_eq!(orchestrator.log().messages()[1].role, Role::Assistant);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Done));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, Role::System);
        let today = Local::now().format("%Y-%m-%d").to_string();
        assert!(requests[0][0].text().unwrap().contains(&today));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_fails_twice_then_succeeds() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(tool_turn(vec![call(
                "call_1",
                "get_forecast",
                json!({"location": "Rome"}),
            )])),
            Ok(ModelResponse::text("Rome will be sunny.")),
        ]));
        let (registry, attempts) = flaky_registry(2);
        let mut orchestrator = Orchestrator::new(provider.clone(), registry);

        let started = Instant::now();
        let events = collect(&mut orchestrator, "Weather in Rome?").await;

        let mut arguments = Arguments::new();
        arguments.insert("location".to_string(), json!("Rome"));
        assert_eq!(
            events,
            vec![
                Event::tool_call("get_forecast", arguments),
                Event::tool_result("get_forecast", &ToolCallResult::success("Sunny, 24C")),
                Event::message("Rome will be sunny."),
            ]
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 1s then 2s of backoff
        assert!(started.elapsed() >= Duration::from_secs(3));

        let log = orchestrator.log().messages();
        assert_eq!(log.len(), 4);
        assert_eq!(log[1].tool_calls()[0].id, "call_1");
        assert_eq!(log[2].role, Role::Tool);
        assert_eq!(log[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(log[2].text(), Some("Sunny, 24C"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_exhausts_retries_and_loop_continues() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(tool_turn(vec![call(
                "call_1",
                "get_forecast",
                json!({"location": "Rome"}),
            )])),
            Ok(ModelResponse::text("The weather service is down, sorry.")),
        ]));
        let (registry, attempts) = flaky_registry(usize::MAX);
        let mut orchestrator = Orchestrator::new(provider.clone(), registry);

        let events = collect(&mut orchestrator, "Weather in Rome?").await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            Event::tool_result(
                "get_forecast",
                &ToolCallResult::error("Error executing tool get_forecast: weather service timeout"),
            )
        );
        assert_eq!(events[2], Event::message("The weather service is down, sorry."));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(provider.calls(), 2);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool_is_not_retried() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(tool_turn(vec![call("call_1", "teleport", json!({}))])),
            Ok(ModelResponse::text("I cannot teleport you.")),
        ]));
        let (registry, attempts) = flaky_registry(0);
        let mut orchestrator = Orchestrator::new(provider, registry);

        let started = Instant::now();
        let events = collect(&mut orchestrator, "Teleport me to Paris").await;

        assert_eq!(events[0], Event::tool_call("teleport", Arguments::new()));
        assert_eq!(
            events[1],
            Event::tool_result("teleport", &ToolCallResult::error("Tool not found: teleport"))
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_failure_ends_run_with_one_error() {
        let provider = Arc::new(MockProvider::new(vec![
            Err(anyhow!("connection refused")),
            Err(anyhow!("connection refused")),
            Err(anyhow!("connection refused")),
            Ok(ModelResponse::text("never reached")),
        ]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        let started = Instant::now();
        let events = collect(&mut orchestrator, "Hello").await;

        assert_eq!(
            events,
            vec![Event::error(
                "I'm having trouble connecting to my brain right now. Error: connection refused"
            )]
        );
        assert_eq!(provider.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(orchestrator.log().len(), 1);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_recovers_after_retry() {
        let provider = Arc::new(MockProvider::new(vec![
            Err(anyhow!("503 Service Unavailable")),
            Ok(ModelResponse::text("Back online.")),
        ]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        let events = collect(&mut orchestrator, "Hello").await;

        assert_eq!(events, vec![Event::message("Back online.")]);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_limit_bounds_model_calls() {
        let provider = Arc::new(MockProvider::new(vec![]).repeating(tool_turn(vec![call(
            "call_1",
            "get_forecast",
            json!({"location": "Rome"}),
        )])));
        let (registry, _) = flaky_registry(0);
        let mut orchestrator = Orchestrator::new(provider.clone(), registry);

        let events = collect(&mut orchestrator, "Loop forever").await;

        assert_eq!(provider.calls(), 10);
        assert_eq!(events.len(), 20);
        assert!(events.iter().all(|e| !e.is_error()));
        assert!(!events.iter().any(|e| matches!(e, Event::Message { .. })));
        assert_eq!(orchestrator.last_stop(), Some(StopReason::TurnLimit));
        // user + 10 x (assistant, tool)
        assert_eq!(orchestrator.log().len(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_calls_run_in_model_order() {
        let registry = ToolRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = order.clone();
        registry.register(
            "get_forecast",
            "Weather forecast",
            ToolSchema::new().required("location", ParamType::String, "City"),
            move |args: Arguments| {
                let location = args["location"].as_str().unwrap_or_default().to_string();
                seen.lock().unwrap().push(location.clone());
                async move { anyhow::Ok(location) }
            },
        );
        let provider = Arc::new(MockProvider::new(vec![
            Ok(ModelResponse::text("Checking both cities.")
                .with_tool_call(call("a", "get_forecast", json!({"location": "Oslo"})))
                .with_tool_call(call("b", "get_forecast", json!({"location": "Lima"})))),
            Ok(ModelResponse::text("Done.")),
        ]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(registry));

        let events = collect(&mut orchestrator, "Weather in Oslo and Lima").await;

        assert_eq!(*order.lock().unwrap(), vec!["Oslo", "Lima"]);
        assert_eq!(events[0], Event::message("Checking both cities."));
        assert!(matches!(&events[1], Event::ToolCall { name, .. } if name == "get_forecast"));
        assert!(matches!(&events[2], Event::ToolResult { text, .. } if text == "Oslo"));
        assert!(matches!(&events[4], Event::ToolResult { text, .. } if text == "Lima"));
        assert_eq!(events[5], Event::message("Done."));

        // The second model call sees both results, in order, after the assistant turn
        let second = &provider.requests()[1];
        let ids: Vec<_> = second
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let provider = Arc::new(MockProvider::new(vec![Ok(ModelResponse::text("Hi"))]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let events: Vec<Event> = orchestrator
            .run_with_cancel("Hello", cancel)
            .collect()
            .await;

        assert!(events.is_empty());
        assert_eq!(provider.calls(), 0);
        assert_eq!(orchestrator.log().len(), 1);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_tool_calls_closes_pending() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let registry = ToolRegistry::new();
        registry.register(
            "book_flight",
            "Book a flight",
            ToolSchema::new(),
            move |_args: Arguments| {
                trigger.cancel();
                async move { anyhow::Ok("BK12345") }
            },
        );
        let provider = Arc::new(MockProvider::new(vec![Ok(tool_turn(vec![
            call("first", "book_flight", json!({})),
            call("second", "book_flight", json!({})),
        ]))]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(registry));

        let events: Vec<Event> = orchestrator
            .run_with_cancel("Book two seats", cancel)
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::tool_result("book_flight", &ToolCallResult::success("BK12345"))
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Cancelled));

        let log = orchestrator.log().messages();
        assert_eq!(log.len(), 4);
        assert_eq!(log[3].tool_call_id.as_deref(), Some("second"));
        assert_eq!(log[3].text(), Some(CANCELLED_TOOL_TEXT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_wait() {
        let provider = Arc::new(MockProvider::new(vec![Err(anyhow!("timeout"))]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let events: Vec<Event> = orchestrator
            .run_with_cancel("Hello", cancel)
            .collect()
            .await;

        assert!(events.is_empty());
        assert_eq!(provider.calls(), 1);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversation_carries_across_runs() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(ModelResponse::text("From where?")),
            Ok(ModelResponse::text("Searching JFK.")),
        ]));
        let log = ConversationLog::new();
        let mut orchestrator =
            Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new())).with_log(log);

        collect(&mut orchestrator, "Book a flight to London").await;
        collect(&mut orchestrator, "From New York").await;

        let second = &provider.requests()[1];
        // system + user + assistant + user
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].text(), Some("From where?"));
        assert_eq!(orchestrator.into_log().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_cap_cannot_exceed_ceiling() {
        let provider = Arc::new(MockProvider::new(vec![]).repeating(tool_turn(vec![call(
            "call_1",
            "get_forecast",
            json!({"location": "Rome"}),
        )])));
        let (registry, _) = flaky_registry(0);
        let mut orchestrator = Orchestrator::new(provider.clone(), registry).with_config(AgentConfig {
            max_turns: 50,
            ..AgentConfig::default()
        });
        assert_eq!(orchestrator.config().max_turns, MAX_TURNS);

        collect(&mut orchestrator, "Loop forever").await;
        assert_eq!(provider.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_turn_cap_still_asks_the_model_once() {
        let provider = Arc::new(MockProvider::new(vec![Ok(ModelResponse::text("Hi there"))]));
        let mut orchestrator =
            Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new())).with_config(AgentConfig {
                max_turns: 0,
                ..AgentConfig::default()
            });
        assert_eq!(orchestrator.config().max_turns, 1);

        let events = collect(&mut orchestrator, "Hello").await;
        assert_eq!(events, vec![Event::message("Hi there")]);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_is_logged_after_its_event() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(ModelResponse::text("Lisbon it is")),
            Ok(ModelResponse::text("Lisbon it is")),
        ]));
        let mut orchestrator = Orchestrator::new(provider, Arc::new(ToolRegistry::new()));

        {
            let mut events = orchestrator.run("Somewhere sunny");
            assert_eq!(events.next().await, Some(Event::message("Lisbon it is")));
            // consumer walks away before the run resumes
        }
        assert_eq!(orchestrator.log().len(), 1);
        assert_eq!(orchestrator.log().messages()[0].role, Role::User);

        collect(&mut orchestrator, "Somewhere sunny").await;
        let log = orchestrator.log().messages();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].role, Role::Assistant);
        assert_eq!(log[2].text(), Some("Lisbon it is"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_starts_fresh() {
        let provider = Arc::new(MockProvider::new(vec![
            Ok(ModelResponse::text("From where?")),
            Ok(ModelResponse::text("Hello again")),
        ]));
        let mut orchestrator = Orchestrator::new(provider.clone(), Arc::new(ToolRegistry::new()));

        collect(&mut orchestrator, "Book a flight to London").await;
        orchestrator.reset();
        assert!(orchestrator.log().is_empty());
        assert_eq!(orchestrator.last_stop(), None);

        collect(&mut orchestrator, "Hi").await;
        // system + user only
        assert_eq!(provider.requests()[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_not_logged() {
        let provider = Arc::new(MockProvider::new(vec![Ok(ModelResponse::default())]));
        let mut orchestrator = Orchestrator::new(provider, Arc::new(ToolRegistry::new()));

        let events = collect(&mut orchestrator, "Hello").await;

        assert!(events.is_empty());
        assert_eq!(orchestrator.log().len(), 1);
        assert_eq!(orchestrator.last_stop(), Some(StopReason::Done));
    }

    #[test]
    fn test_retry_policy_delays() {
        let config = AgentConfig::default();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.model_retry.delay(1), Duration::from_secs(1));
        assert_eq!(config.model_retry.delay(2), Duration::from_secs(1));
        assert_eq!(config.tool_retry.delay(1), Duration::from_secs(1));
        assert_eq!(config.tool_retry.delay(2), Duration::from_secs(2));
        assert_eq!(config.tool_retry.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_text_document_is_inlined() {
        let message = UserInput::new("Summarise this")
            .with_attachment("text/plain", b"Gate B12, boarding 10:40".to_vec())
            .into_message();

        assert!(message.attachments.is_empty());
        let text = message.text().unwrap();
        assert!(text.starts_with("Summarise this"));
        assert!(text.contains("ATTACHED DOCUMENT START"));
        assert!(text.contains("Gate B12, boarding 10:40"));
    }

    #[test]
    fn test_image_stays_attached() {
        let message = UserInput::new("What city is this?")
            .with_attachment("image/jpeg", vec![0xff, 0xd8])
            .into_message();

        assert_eq!(message.text(), Some("What city is this?"));
        assert_eq!(message.attachments.len(), 1);
        assert!(message.attachments[0].is_image());
    }
}
