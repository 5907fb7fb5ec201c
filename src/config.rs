use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{info, warn};

use crate::llm_providers::LlmProviderType;

/// Complete engine configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Generation backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LlmProviderType,
    pub model: Option<String>,
}

/// Where and how often learner state is written.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub state_path: PathBuf,
    pub flush_debounce_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            llm: LlmConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        config.log_configuration_summary();
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data).
    fn log_configuration_summary(&self) {
        info!(
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            state_path = %self.storage.state_path.display(),
            flush_debounce_ms = self.storage.flush_debounce_ms,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.state_path.as_os_str().is_empty() {
            return Err(anyhow!("STATE_PATH must not be empty"));
        }

        if self.storage.flush_debounce_ms == 0 {
            return Err(anyhow!("FLUSH_DEBOUNCE_MS must be greater than 0"));
        }

        if self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key" {
            warn!("LLM API key appears to be placeholder or empty - generation features may not work");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|lvl| self.logging.level.to_lowercase().starts_with(lvl))
        {
            warn!("Unrecognized log level '{}', tracing will fall back to its default", self.logging.level);
        }

        Ok(())
    }
}

impl LlmConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());

        let base_url = env::var("LLM_BASE_URL").ok();

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string());

        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" | "google" => LlmProviderType::Gemini,
            "openai" | "chatgpt" | "gpt" => LlmProviderType::OpenAi,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to Gemini", provider_str);
                LlmProviderType::Gemini
            }
        };

        let model = env::var("LLM_MODEL").ok();

        Ok(LlmConfig {
            api_key,
            base_url,
            provider,
            model,
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self> {
        let state_path = env::var("STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("lexis_state.json"));

        let debounce_str = env::var("FLUSH_DEBOUNCE_MS").unwrap_or_else(|_| "1000".to_string());
        let flush_debounce_ms = debounce_str.parse::<u64>().map_err(|_| {
            anyhow!("Invalid FLUSH_DEBOUNCE_MS value: '{}'. Must be a number of milliseconds", debounce_str)
        })?;

        Ok(StorageConfig {
            state_path,
            flush_debounce_ms,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,lexis_engine=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Mask sensitive data in configuration for safe logging.
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
