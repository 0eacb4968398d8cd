use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    /// Build an execution error from anything displayable, such as an `anyhow::Error`
    pub fn execution<E: std::fmt::Display>(err: E) -> Self {
        ToolError::Execution(err.to_string())
    }

    /// Whether another attempt could produce a different outcome
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ToolError::NotFound(_))
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
