use crate::art::ThreadConfig;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Environment-driven settings. The API key is optional here; its absence
/// only becomes fatal when the framework instance is acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub history_limit: usize,
    pub gemini_base_url: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let history_limit = match read("ART_HISTORY_LIMIT") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        key: "ART_HISTORY_LIMIT",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_HISTORY_LIMIT,
        };

        Ok(Self {
            gemini_api_key: read("GEMINI_API_KEY"),
            model: read("ART_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            history_limit,
            gemini_base_url: read("ART_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            log_level: read("ART_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    pub fn default_thread_config(&self) -> ThreadConfig {
        ThreadConfig::gemini(self.model.clone(), self.history_limit)
    }
}
