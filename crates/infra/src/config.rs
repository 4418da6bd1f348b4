//! Environment-driven configuration.
//!
//! Everything is read once at startup and passed down explicitly; nothing here
//! is consulted at call time.

use std::time::Duration;

use thiserror::Error;

use insightforge_ai::ModelTier;
use insightforge_invoke::{PollerConfig, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Absence is reported as a configuration failure on the first call.
    pub api_key: Option<String>,
    /// Fallback order, most preferred first.
    pub models: Vec<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_jitter: f64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl InferenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.timeout, self.max_attempts, self.retry_base).with_jitter(self.retry_jitter)
    }

    pub fn tiers(&self) -> Vec<ModelTier> {
        let policy = self.retry_policy();
        self.models
            .iter()
            .map(|model| ModelTier::new(model.as_str(), policy.clone()))
            .collect()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            timeout: Duration::from_millis(30_000),
            max_attempts: 3,
            retry_base: Duration::from_millis(1_000),
            retry_jitter: 0.0,
            temperature: 0.3,
            max_tokens: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaConfig {
    /// Media processing is disabled when unset.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsightConfig {
    pub bind_addr: String,
    pub inference: InferenceConfig,
    pub media: MediaConfig,
    /// In-memory storage when unset.
    pub database_url: Option<String>,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            inference: InferenceConfig::default(),
            media: MediaConfig::default(),
            database_url: None,
        }
    }
}

impl InsightConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let models = match get("INFERENCE_MODELS") {
            Some(raw) => {
                let models: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                if models.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "INFERENCE_MODELS",
                        value: raw,
                    });
                }
                models
            }
            None => defaults.inference.models.clone(),
        };

        let retry_jitter: f64 = parse(&get, "INFERENCE_RETRY_JITTER", defaults.inference.retry_jitter)?;
        if !(0.0..=1.0).contains(&retry_jitter) {
            return Err(ConfigError::Invalid {
                key: "INFERENCE_RETRY_JITTER",
                value: retry_jitter.to_string(),
            });
        }

        let inference = InferenceConfig {
            base_url: get("INFERENCE_BASE_URL").unwrap_or(defaults.inference.base_url),
            api_key: get("INFERENCE_API_KEY"),
            models,
            timeout: Duration::from_millis(parse(&get, "INFERENCE_TIMEOUT_MS", 30_000u64)?),
            max_attempts: parse(&get, "INFERENCE_MAX_ATTEMPTS", defaults.inference.max_attempts)?,
            retry_base: Duration::from_millis(parse(&get, "INFERENCE_RETRY_BASE_MS", 1_000u64)?),
            retry_jitter,
            temperature: parse(&get, "INFERENCE_TEMPERATURE", defaults.inference.temperature)?,
            max_tokens: parse(&get, "INFERENCE_MAX_TOKENS", defaults.inference.max_tokens)?,
        };

        let poll_interval_ms: u64 = parse(&get, "MEDIA_POLL_INTERVAL_MS", 5_000u64)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "MEDIA_POLL_INTERVAL_MS",
                value: poll_interval_ms.to_string(),
            });
        }

        let poller_defaults = PollerConfig::default();
        let media = MediaConfig {
            base_url: get("MEDIA_BASE_URL"),
            api_key: get("MEDIA_API_KEY"),
            poller: PollerConfig {
                interval: Duration::from_millis(poll_interval_ms),
                deadline: Duration::from_secs(parse(&get, "MEDIA_JOB_DEADLINE_SECS", 300u64)?),
                poll_error_budget: parse(&get, "MEDIA_POLL_ERROR_BUDGET", poller_defaults.poll_error_budget)?,
                cleanup_timeout: poller_defaults.cleanup_timeout,
            },
        };

        Ok(Self {
            bind_addr: get("INSIGHT_BIND_ADDR").unwrap_or(defaults.bind_addr),
            inference,
            media,
            database_url: get("DATABASE_URL"),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
