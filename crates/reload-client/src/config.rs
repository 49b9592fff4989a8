//! Environment-backed configuration for the reload client.

use std::{env, error::Error, fmt};

use reload_core::{ReloadError, RetryPolicy};

/// Socket path of the watcher's notification channel.
pub const CHANNEL_ENV: &str = "RELOAD_CHANNEL";
const RETRY_BASE_ENV: &str = "RELOAD_RETRY_BASE_MS";
const RETRY_MAX_ATTEMPTS_ENV: &str = "RELOAD_RETRY_MAX_ATTEMPTS";
const RETRY_MAX_ELAPSED_ENV: &str = "RELOAD_RETRY_MAX_ELAPSED_MS";

/// Runtime configuration for one `ReloadManager`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientConfig {
    /// Channel identifier. `None` when nothing was configured; `run` rejects
    /// that before contacting the transport.
    pub channel: Option<String>,
    /// Backoff used for connecting and for the startup announcement.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse configuration from environment variables.
    ///
    /// A missing channel is not an error here; only malformed values are.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let channel = optional_trimmed_env(CHANNEL_ENV, &mut lookup);

        let defaults = RetryPolicy::default();
        let base_delay_ms = parse_optional_u64(RETRY_BASE_ENV, &mut lookup)?
            .unwrap_or(defaults.base_delay_ms());
        let max_attempts = parse_optional_u32(RETRY_MAX_ATTEMPTS_ENV, &mut lookup)?
            .unwrap_or(defaults.max_attempts());
        let max_elapsed_ms = parse_optional_u64(RETRY_MAX_ELAPSED_ENV, &mut lookup)?
            .unwrap_or(defaults.max_elapsed().as_millis() as u64);

        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: RETRY_MAX_ATTEMPTS_ENV,
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let retry = RetryPolicy::new(base_delay_ms, defaults.max_delay_ms().max(base_delay_ms))
            .with_max_attempts(max_attempts)
            .with_max_elapsed_ms(max_elapsed_ms);

        Ok(Self { channel, retry })
    }

    /// The channel to connect to, or the configuration error `run` reports.
    pub fn validated_channel(&self) -> Result<&str, ReloadError> {
        let Some(channel) = self.channel.as_deref() else {
            return Err(ReloadError::config(
                "missing_channel",
                format!("{CHANNEL_ENV} is not set"),
            ));
        };
        if channel.trim().is_empty() || channel.contains('\0') {
            return Err(ReloadError::config(
                "invalid_channel",
                format!("invalid channel identifier '{}'", channel.escape_debug()),
            ));
        }
        Ok(channel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

impl From<ConfigError> for ReloadError {
    fn from(err: ConfigError) -> Self {
        ReloadError::config("invalid_value", err.to_string())
    }
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_u32<F>(key: &'static str, lookup: &mut F) -> Result<Option<u32>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
