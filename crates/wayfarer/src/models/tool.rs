use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named arguments for a tool call, keyed by parameter name
pub type Arguments = Map<String, Value>;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// The name of the tool, unique within a registry
    pub name: String,
    /// A description of what the tool does, used by the model to pick it
    pub description: String,
    /// JSON-Schema-like description of the accepted parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition with the given name, description and parameter schema
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names of the properties declared in the parameter schema, in schema order
    pub fn property_names(&self) -> Vec<&str> {
        self.parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// A request from the model to run one tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    /// Opaque identifier, unique within one assistant turn
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Arguments,
}

impl ToolCallRequest {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, name: S, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a request from any json value, treating non-object values as no arguments
    pub fn from_value<I: Into<String>, S: Into<String>>(id: I, name: S, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Arguments::new(),
        };
        Self::new(id, name, arguments)
    }
}

/// The uniform outcome of dispatching a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}
