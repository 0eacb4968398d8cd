use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wayfarer::conversation::ConversationLog;
use wayfarer::orchestrator::AgentConfig;
use wayfarer::providers::Provider;
use wayfarer::tools::ToolRegistry;

/// A session's log, or nothing while a run has it checked out
type Slot = Option<ConversationLog>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub agent: AgentConfig,
    sessions: Arc<Mutex<HashMap<String, Slot>>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, agent: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            agent,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the session's log for a run. `None` if another run holds it.
    pub fn checkout(&self, session_id: &str) -> Option<ConversationLog> {
        let mut sessions = self.sessions();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Some(ConversationLog::new()))
            .take()
    }

    /// Hand the log back once the run is over
    pub fn checkin(&self, session_id: &str, log: ConversationLog) {
        self.sessions().insert(session_id.to_string(), Some(log));
    }

    /// Forget a session. Returns false while a run holds it.
    pub fn reset(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions();
        match sessions.get(session_id) {
            Some(None) => false,
            _ => {
                sessions.remove(session_id);
                true
            }
        }
    }

    /// A copy of the session's log, if it exists and is not mid-run
    pub fn snapshot(&self, session_id: &str) -> Option<ConversationLog> {
        self.sessions().get(session_id).cloned().flatten()
    }
}
