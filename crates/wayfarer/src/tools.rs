pub mod cache;
pub mod registry;
pub mod schema;

pub use cache::{ToolCache, DEFAULT_TTL};
pub use registry::ToolRegistry;
pub use schema::{ParamType, ToolSchema};
