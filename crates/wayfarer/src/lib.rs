pub mod auth;
pub mod conversation;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod prompt_template;
pub mod providers;
pub mod tools;
pub mod travel;
