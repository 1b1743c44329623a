//! Runtime configuration from the environment
//!
//! Binaries call `dotenv::dotenv().ok()` first, so a local `.env` works the
//! same as exported variables.

use crate::error::HubError;
use crate::plugin::{PluginContext, RetryPolicy};
use crate::provider::ProviderClient;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How dispatch failures map onto HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorClassification {
    /// Every failure is a 400
    #[default]
    Collapsed,
    /// Caller mistakes are 4xx, handler failures are 500
    Split,
}

impl FromStr for ErrorClassification {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collapsed" => Ok(ErrorClassification::Collapsed),
            "split" => Ok(ErrorClassification::Split),
            other => Err(HubError::Config(format!(
                "HUB_ERROR_CLASSIFICATION must be 'collapsed' or 'split', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub port: u16,
    pub provider_base_url: Option<String>,
    pub provider_token: Option<String>,
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
    pub error_classification: ErrorClassification,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            provider_base_url: None,
            provider_token: None,
            provider_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            error_classification: ErrorClassification::default(),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse("PORT", &raw)?,
            None => defaults.port,
        };

        let max_attempts = match get("HUB_RETRY_MAX_ATTEMPTS") {
            Some(raw) => parse::<u32>("HUB_RETRY_MAX_ATTEMPTS", &raw)?,
            None => defaults.retry.max_attempts,
        };
        if max_attempts == 0 {
            return Err(HubError::Config("HUB_RETRY_MAX_ATTEMPTS must be at least 1".into()));
        }
        let min_wait = match get("HUB_RETRY_MIN_WAIT_MS") {
            Some(raw) => Duration::from_millis(parse("HUB_RETRY_MIN_WAIT_MS", &raw)?),
            None => defaults.retry.min_wait,
        };
        let max_wait = match get("HUB_RETRY_MAX_WAIT_MS") {
            Some(raw) => Duration::from_millis(parse("HUB_RETRY_MAX_WAIT_MS", &raw)?),
            None => defaults.retry.max_wait,
        };
        if min_wait > max_wait {
            return Err(HubError::Config(format!(
                "retry min wait ({:?}) exceeds max wait ({:?})",
                min_wait, max_wait
            )));
        }

        let provider_timeout = match get("HUB_PROVIDER_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse("HUB_PROVIDER_TIMEOUT_SECS", &raw)?),
            None => defaults.provider_timeout,
        };

        let error_classification = match get("HUB_ERROR_CLASSIFICATION") {
            Some(raw) => raw.parse()?,
            None => defaults.error_classification,
        };

        Ok(Self {
            port,
            provider_base_url: get("DATA_PROVIDER_BASE_URL"),
            provider_token: get("DATA_PROVIDER_TOKEN"),
            provider_timeout,
            retry: RetryPolicy {
                max_attempts,
                min_wait,
                max_wait,
                ..defaults.retry
            },
            error_classification,
        })
    }

    /// Plugin resources; the provider client exists only when a base URL is set
    pub fn plugin_context(&self) -> Result<PluginContext> {
        let provider = match &self.provider_base_url {
            Some(base_url) => Some(ProviderClient::new(
                base_url,
                self.provider_token.as_deref().unwrap_or_default(),
                self.provider_timeout,
            )?),
            None => None,
        };
        Ok(PluginContext { provider })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| HubError::Config(format!("{}='{}' is invalid: {}", key, raw, e)))
}
