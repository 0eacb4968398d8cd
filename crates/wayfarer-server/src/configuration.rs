use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use wayfarer::orchestrator::{AgentConfig, RetryPolicy, MAX_TURNS};
use wayfarer::providers::configs::{
    AnthropicProviderConfig, GoogleProviderConfig, OpenAiProviderConfig, ProviderConfig,
    ANTHROPIC_HOST, ANTHROPIC_MODEL, GOOGLE_HOST, GOOGLE_MODEL, OPENAI_HOST, OPENAI_MODEL,
};
use wayfarer::providers::ProviderType;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Google {
        #[serde(default = "default_google_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_google_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::Google { .. } => ProviderType::Google,
        }
    }

    // Convert to the library's ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Google {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Google(GoogleProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// Turn loop limits. Retry counts include the first attempt, the turn cap is at most
/// [`MAX_TURNS`].
#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_attempts")]
    pub model_attempts: u32,
    #[serde(default = "default_attempts")]
    pub tool_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            model_attempts: default_attempts(),
            tool_attempts: default_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl AgentSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TURNS).contains(&self.max_turns) {
            return Err(ConfigError::OutOfRange {
                env_var: to_env_var("agent.max_turns"),
                value: self.max_turns.to_string(),
                min: 1,
                max: MAX_TURNS,
            });
        }
        Ok(())
    }

    pub fn to_config(&self) -> AgentConfig {
        let delay = Duration::from_millis(self.retry_delay_ms);
        AgentConfig {
            max_turns: self.max_turns,
            model_retry: RetryPolicy::fixed(self.model_attempts, delay),
            tool_retry: RetryPolicy::linear(self.tool_attempts, delay),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("WAYFARER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => {
                settings.agent.validate()?;
                Ok(settings)
            }
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Only provider fields are required, so a bare field name belongs there
                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
                    let path = match field {
                        "provider" => "provider.type".to_string(),
                        field if field.contains('.') => field.to_string(),
                        field => format!("provider.{}", field),
                    };
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&path),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

// Extract the name from "missing field `type`"
fn missing_field(error: &str) -> Option<&str> {
    let rest = error.split("missing field `").nth(1)?;
    rest.split('`').next()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_turns() -> usize {
    10
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_google_host() -> String {
    GOOGLE_HOST.to_string()
}

fn default_google_model() -> String {
    GOOGLE_MODEL.to_string()
}
