//! Runtime configuration.
//!
//! Values come from `BARANGAY_*` environment variables, optionally loaded from
//! a `.env` file. Anything unset falls back to [`BarangayConfig::default`].

use serde::{Deserialize, Serialize};

use crate::error::{BarangayError, Result};
use crate::request::FeeSchedule;

const ENV_PREFIX: &str = "BARANGAY_";

/// Configuration for the hosted text model used by the insight flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextModelConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,

    /// Model name sent with every completion
    pub model: String,

    /// Bearer token; left out of the request when empty
    #[serde(skip_serializing, default)]
    pub api_key: String,

    /// Timeout for each completion call in milliseconds
    pub timeout_ms: u64,
}

impl Default for TextModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            timeout_ms: 60000, // 1 minute
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarangayConfig {
    /// Fee table applied to new requests
    pub fees: FeeSchedule,

    pub text_model: TextModelConfig,

    /// PostgreSQL connection string; `None` means in-memory storage
    pub database_url: Option<String>,
}

/// Flat view of the environment, as envy sees it after stripping the prefix.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    database_url: Option<String>,
    text_model_endpoint: Option<String>,
    text_model_name: Option<String>,
    text_model_api_key: Option<String>,
    text_model_timeout_ms: Option<u64>,
    fees: Option<String>,
}

impl BarangayConfig {
    /// Load configuration from the process environment and `.env`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let env: EnvConfig = envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| BarangayError::Validation(format!("Invalid configuration: {}", e)))?;
        Self::from_parts(env)
    }

    /// Load configuration from explicit key/value pairs, using the same
    /// variable names as [`BarangayConfig::from_env`].
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: EnvConfig = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .map_err(|e| BarangayError::Validation(format!("Invalid configuration: {}", e)))?;
        Self::from_parts(env)
    }

    fn from_parts(env: EnvConfig) -> Result<Self> {
        let defaults = TextModelConfig::default();
        let fees = match env.fees.as_deref() {
            Some(json) if !json.trim().is_empty() => FeeSchedule::from_json(json)?,
            _ => FeeSchedule::default(),
        };

        let config = Self {
            fees,
            text_model: TextModelConfig {
                endpoint: env.text_model_endpoint.unwrap_or(defaults.endpoint),
                model: env.text_model_name.unwrap_or(defaults.model),
                api_key: env.text_model_api_key.unwrap_or(defaults.api_key),
                timeout_ms: env.text_model_timeout_ms.unwrap_or(defaults.timeout_ms),
            },
            database_url: env.database_url.filter(|url| !url.trim().is_empty()),
        };

        tracing::debug!(
            endpoint = %config.text_model.endpoint,
            model = %config.text_model.model,
            has_database = config.database_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
