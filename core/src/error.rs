use std::path::PathBuf;

use thiserror::Error;

use crate::config::ChannelId;

/// Missing or invalid configuration. Fatal: nothing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required config value `{0}`")]
    Missing(&'static str),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure of a single call to the chat transport's directory/history API.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("channel {0} not found")]
    NotFound(ChannelId),

    #[error("{0} is not available through this transport")]
    Unsupported(&'static str),

    #[error("{0}")]
    Request(String),
}

/// A channel's addressing metadata could not be determined. Recoverable per channel.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("channel {channel} not found, make sure the account has joined it (direct lookup: {direct})")]
    NotFound {
        channel: ChannelId,
        direct: DirectoryError,
    },

    #[error("channel {channel}: direct lookup failed ({direct}) and conversation list failed ({listing})")]
    ListingFailed {
        channel: ChannelId,
        direct: DirectoryError,
        listing: DirectoryError,
    },
}

/// Per-channel backfill failure. Collected by the caller; never aborts other channels.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("failed to fetch history for channel {channel}: {source}")]
    History {
        channel: ChannelId,
        #[source]
        source: DirectoryError,
    },
}

/// The transport session could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Telegram refused the session: {0}")]
    Rejected(TelegramApiError),

    #[error("cancelled before the session was established")]
    Cancelled,
}

/// A Telegram Bot API call failed.
#[derive(Debug, Error)]
pub enum TelegramApiError {
    /// Network or HTTP-level failure. The request URL (which embeds the bot token) is stripped.
    #[error("request failed: {0}")]
    Network(String),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
}

impl From<reqwest::Error> for TelegramApiError {
    fn from(e: reqwest::Error) -> Self {
        TelegramApiError::Network(e.without_url().to_string())
    }
}
