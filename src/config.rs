//! Environment-driven configuration

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Settings for the transport client
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Characters per simulated fragment (0 = whole reply)
    pub stream_chunk_chars: usize,
    pub stream_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            stream_chunk_chars: 0,
            stream_interval: Duration::ZERO,
        }
    }
}

/// Which turns are sent with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    /// Only the user turn being answered
    #[default]
    LatestTurn,
    /// Every settled turn of the transcript, then the new user turn
    FullTranscript,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatConfig {
    pub transport: TransportConfig,
    pub history: HistoryMode,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TransportConfig::default();

        let transport = TransportConfig {
            endpoint: lookup("MOLLY_ENDPOINT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.endpoint),
            model: lookup("MOLLY_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.model),
            max_tokens: parse_var(&lookup, "MOLLY_MAX_TOKENS")?.unwrap_or(defaults.max_tokens),
            temperature: parse_var(&lookup, "MOLLY_TEMPERATURE")?
                .unwrap_or(defaults.temperature),
            timeout: parse_var(&lookup, "MOLLY_TIMEOUT_SECS")?
                .map_or(defaults.timeout, Duration::from_secs),
            stream_chunk_chars: parse_var(&lookup, "MOLLY_STREAM_CHUNK_CHARS")?
                .unwrap_or(defaults.stream_chunk_chars),
            stream_interval: parse_var(&lookup, "MOLLY_STREAM_INTERVAL_MS")?
                .map_or(defaults.stream_interval, Duration::from_millis),
        };

        let history = match parse_var::<bool, _>(&lookup, "MOLLY_SEND_HISTORY")? {
            Some(true) => HistoryMode::FullTranscript,
            Some(false) | None => HistoryMode::LatestTurn,
        };

        Ok(Self { transport, history })
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
