use super::{
    anthropic::AnthropicProvider,
    base::Provider,
    configs::{
        AnthropicProviderConfig, GoogleProviderConfig, OpenAiProviderConfig, ProviderConfig,
    },
    google::GoogleProvider,
    openai::OpenAiProvider,
};
use anyhow::Result;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderType {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderType {
    /// A config with vendor defaults for everything but the key
    pub fn default_config<S: Into<String>>(self, api_key: S) -> ProviderConfig {
        match self {
            ProviderType::OpenAi => ProviderConfig::OpenAi(OpenAiProviderConfig::new(api_key)),
            ProviderType::Anthropic => {
                ProviderConfig::Anthropic(AnthropicProviderConfig::new(api_key))
            }
            ProviderType::Google => ProviderConfig::Google(GoogleProviderConfig::new(api_key)),
        }
    }
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::Google(_) => ProviderType::Google,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::Google(google_config) => Ok(Arc::new(GoogleProvider::new(google_config)?)),
    }
}
