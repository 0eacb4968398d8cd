pub mod anthropic;
pub mod base;
pub mod configs;
pub mod factory;
pub mod google;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub mod mock;

pub use base::{ModelResponse, Provider, Usage};
pub use configs::ProviderConfig;
pub use factory::{get_provider, ProviderType};
