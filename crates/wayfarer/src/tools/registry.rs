use futures::future::BoxFuture;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::ToolCache;
use super::schema::ToolSchema;
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{Arguments, ToolCallResult, ToolDefinition};

type Handler = Arc<dyn Fn(Arguments) -> BoxFuture<'static, ToolResult<String>> + Send + Sync>;

struct Entry {
    definition: ToolDefinition,
    handler: Handler,
    cache: Option<Arc<ToolCache>>,
}

/// Holds the callable tools and dispatches calls to them by name.
///
/// A registry is shared between conversations behind an `Arc`, so every handler must be
/// safe to run concurrently with itself.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler that takes the raw argument map, with an explicit schema.
    ///
    /// Registering a name twice replaces the earlier tool and keeps its position.
    pub fn register<N, D, F, Fut, R>(&self, name: N, description: D, schema: ToolSchema, handler: F)
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let handler: Handler = Arc::new(move |arguments| {
            let fut = handler(arguments);
            async move { fut.await.map_err(ToolError::execution).and_then(render) }.boxed()
        });
        self.insert(
            ToolDefinition::new(name, description, schema.to_value()),
            handler,
        );
    }

    /// Register a synchronous handler, deriving the schema from its argument type.
    ///
    /// The handler runs on the blocking pool so slow lookups do not stall the turn loop.
    pub fn register_fn<A, N, D, F, R>(&self, name: N, description: D, handler: F)
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        N: Into<String>,
        D: Into<String>,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Serialize + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: Handler = Arc::new(move |arguments| {
            let handler = handler.clone();
            async move {
                let args = decode::<A>(arguments)?;
                let output = tokio::task::spawn_blocking(move || handler(args))
                    .await
                    .map_err(ToolError::execution)?;
                output.map_err(ToolError::execution).and_then(render)
            }
            .boxed()
        });
        self.insert(
            ToolDefinition::new(name, description, ToolSchema::derive::<A>().to_value()),
            wrapped,
        );
    }

    /// Register an asynchronous handler, deriving the schema from its argument type
    pub fn register_async<A, N, D, F, Fut, R>(&self, name: N, description: D, handler: F)
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        N: Into<String>,
        D: Into<String>,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: Handler = Arc::new(move |arguments| {
            let handler = handler.clone();
            async move {
                let args = decode::<A>(arguments)?;
                handler(args)
                    .await
                    .map_err(ToolError::execution)
                    .and_then(render)
            }
            .boxed()
        });
        self.insert(
            ToolDefinition::new(name, description, ToolSchema::derive::<A>().to_value()),
            wrapped,
        );
    }

    fn insert(&self, definition: ToolDefinition, handler: Handler) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        debug!(tool = %definition.name, "registering tool");
        let entry = Entry {
            definition,
            handler,
            cache: None,
        };
        match entries
            .iter_mut()
            .find(|e| e.definition.name == entry.definition.name)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Remember successful results of `name` for `ttl`, keyed by its arguments.
    ///
    /// Only for lookups without side effects. Returns false when no such tool is registered;
    /// registering the name again drops the cache.
    pub fn cache_results(&self, name: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|e| e.definition.name == name) {
            Some(entry) => {
                entry.cache = Some(Arc::new(ToolCache::new(ttl)));
                true
            }
            None => false,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// All registered tool definitions, in registration order
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.read().iter().map(|e| e.definition.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|e| e.definition.name == name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Dispatch a call, reporting failures as typed errors
    pub async fn call(&self, name: &str, arguments: Arguments) -> ToolResult<String> {
        let (handler, cache) = self
            .read()
            .iter()
            .find(|e| e.definition.name == name)
            .map(|e| (e.handler.clone(), e.cache.clone()))
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let cached = cache.map(|cache| {
            let key = ToolCache::key(name, &arguments);
            (cache, key)
        });
        if let Some((cache, key)) = &cached {
            if let Some(text) = cache.get(key) {
                debug!(tool = %name, "cached result");
                return Ok(text);
            }
        }

        let result = run_guarded(name, handler, arguments).await;
        if let (Some((cache, key)), Ok(text)) = (cached, &result) {
            cache.insert(key, text.clone());
        }
        result
    }

    /// Dispatch a call, folding any failure into an error result
    pub async fn invoke(&self, name: &str, arguments: Arguments) -> ToolCallResult {
        to_call_result(name, self.call(name, arguments).await)
    }
}

/// Convert a raw dispatch outcome into the uniform result shape
pub fn to_call_result(name: &str, result: ToolResult<String>) -> ToolCallResult {
    match result {
        Ok(text) => ToolCallResult::success(text),
        Err(err @ ToolError::NotFound(_)) => ToolCallResult::error(err.to_string()),
        Err(err) => ToolCallResult::error(format!("Error executing tool {}: {}", name, err)),
    }
}

// Panics in a handler surface as execution failures
async fn run_guarded(name: &str, handler: Handler, arguments: Arguments) -> ToolResult<String> {
    AssertUnwindSafe(async move { handler(arguments).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            warn!(tool = %name, panic = %message, "tool handler panicked");
            Err(ToolError::Execution(format!("Tool panicked: {}", message)))
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn decode<A: DeserializeOwned>(arguments: Arguments) -> ToolResult<A> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// Text handed back to the model: strings as-is, anything else as compact json
fn render<R: Serialize>(output: R) -> ToolResult<String> {
    match serde_json::to_value(output).map_err(ToolError::execution)? {
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}
