use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("{env_var} must be between {min} and {max}, got {value}")]
    OutOfRange {
        env_var: String,
        value: String,
        min: usize,
        max: usize,
    },

    #[error("Invalid socket address {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Env var that sets a dotted settings path, e.g. `provider.api_key` -> `WAYFARER_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    let field_path = field_path.trim();
    if field_path.is_empty() {
        return "WAYFARER".to_string();
    }
    format!(
        "WAYFARER_{}",
        field_path.replace('.', "__").to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("type"), "WAYFARER_TYPE");
        assert_eq!(to_env_var("provider.api_key"), "WAYFARER_PROVIDER__API_KEY");
        assert_eq!(to_env_var("server.port"), "WAYFARER_SERVER__PORT");
    }

    #[test]
    fn test_missing_env_var_message() {
        let err = ConfigError::MissingEnvVar {
            env_var: to_env_var("provider.api_key"),
        };
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: WAYFARER_PROVIDER__API_KEY"
        );
    }
}
