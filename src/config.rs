use secrecy::{ExposeSecret, SecretBox};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
    #[error("Environment error: {0}")]
    EnvError(#[from] env::VarError),
}

/// Configuration for the remote conversational service and the speech
/// capabilities around it. Everything comes from the environment so the
/// binary can run unchanged on a dev machine or a device.
#[derive(Debug)]
pub struct ApiConfig {
    pub chat_key: SecretBox<String>,
    pub base_url: String,
    pub dataset_key: Option<SecretBox<String>>,
    pub dataset_id: Option<String>,
    pub asr_url: Option<String>,
    pub tts_url: Option<String>,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let chat_key = Self::load_key("DIFY_API_KEY", "app-")?;
        let base_url = Self::load_url("DIFY_BASE_URL")?;

        // Knowledge-base access is optional; without it the pipeline simply
        // has no dataset collaborator.
        let dataset_key = match env::var("DIFY_DATASET_KEY") {
            Ok(_) => Some(Self::load_key("DIFY_DATASET_KEY", "dataset-")?),
            Err(_) => None,
        };
        let dataset_id = env::var("DIFY_DATASET_ID").ok();

        Ok(Self {
            chat_key,
            base_url,
            dataset_key,
            dataset_id,
            asr_url: env::var("ASR_URL").ok(),
            tts_url: env::var("TTS_URL").ok(),
        })
    }

    /// Load and validate a single API key from the environment.
    fn load_key(env_var: &str, expected_prefix: &str) -> Result<SecretBox<String>, ConfigError> {
        let key = env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;

        if key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: env_var.to_string(),
                reason: "API key cannot be empty".to_string(),
            });
        }

        // Dify app keys start with "app-", dataset keys with "dataset-".
        if !key.starts_with(expected_prefix) {
            return Err(ConfigError::InvalidValue {
                var: env_var.to_string(),
                reason: format!("expected a key starting with '{}'", expected_prefix),
            });
        }

        Ok(SecretBox::new(Box::new(key)))
    }

    fn load_url(env_var: &str) -> Result<String, ConfigError> {
        let url = env::var(env_var).map_err(|_| ConfigError::MissingEnvVar(env_var.to_string()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                var: env_var.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }

        // Trailing slash would double up when joining endpoint paths.
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Get the chat API key (use only when making API calls).
    pub fn chat_key(&self) -> &str {
        self.chat_key.expose_secret()
    }

    /// Get the dataset API key, if knowledge-base access is configured.
    pub fn dataset_key(&self) -> Option<&str> {
        self.dataset_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

/// Load configuration with helpful error messages for development.
pub fn load_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(config) => {
            log::info!("Successfully loaded API configuration");
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("{}=your_value_here", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_validation() {
        std::env::set_var("TEST_CHAT_KEY", "app-abc123");
        assert!(ApiConfig::load_key("TEST_CHAT_KEY", "app-").is_ok());
        assert!(ApiConfig::load_key("TEST_CHAT_KEY", "dataset-").is_err());
        std::env::remove_var("TEST_CHAT_KEY");
    }

    #[test]
    fn test_url_validation() {
        std::env::set_var("TEST_BASE_URL", "http://localhost:8086/v1/");
        let url = ApiConfig::load_url("TEST_BASE_URL").unwrap();
        assert_eq!(url, "http://localhost:8086/v1");

        std::env::set_var("TEST_BASE_URL", "localhost:8086");
        assert!(ApiConfig::load_url("TEST_BASE_URL").is_err());
        std::env::remove_var("TEST_BASE_URL");
    }

    #[test]
    fn test_missing_variable() {
        std::env::remove_var("TEST_MISSING_KEY");
        let err = ApiConfig::load_key("TEST_MISSING_KEY", "app-").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }
}
