//! These models represent the objects passed around by the orchestrator
//!
//! There are several different related formats we need to interact with:
//! - openai messages/tools, sent from the orchestrator to the LLM
//! - anthropic messages/tools, sent from the orchestrator to the LLM
//! - google contents/function declarations, sent from the orchestrator to the LLM
//! - events, streamed from the orchestrator to a front end as newline-delimited json
//!
//! These all overlap to varying degrees. Providers convert to and from the internal
//! structs at their boundary, so the conversation log only ever holds these shapes.
pub mod event;
pub mod message;
pub mod role;
pub mod tool;
