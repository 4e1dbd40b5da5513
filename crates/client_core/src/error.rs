use std::time::Duration;

use shared::domain::ChannelKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no live session on channel {0}")]
    NotConnected(ChannelKind),
    #[error("outbound buffer for channel {0} is full")]
    Saturated(ChannelKind),
    #[error("channel {channel} cannot carry {event}")]
    WrongChannel {
        channel: ChannelKind,
        event: &'static str,
    },
    #[error("failed to encode {event}: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid server url '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("delivery did not complete within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("offline queue storage failed: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("offline queue payload is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("offline queue update lost {attempts} consecutive compare-and-swap races")]
    Contended { attempts: usize },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid history url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("history request was rejected as unauthenticated")]
    Unauthorized,
    #[error("history request failed with status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}
