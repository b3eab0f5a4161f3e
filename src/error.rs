use std::time::Duration;

use thiserror::Error;

/// why a chat turn failed. a cancelled session is a state, not an error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// network failure other than a cancellation.
    #[error("{0}")]
    Transport(String),
    /// non-success status before the stream started.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// error payload carried inside the stream.
    #[error("{0}")]
    Application(String),
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),
    #[error("message is empty")]
    EmptyMessage,
}

/// failure to open or read the completion request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] ureq::Error),
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        ChatError::Transport(err.to_string())
    }
}

/// failure of a plain request/response collaborator call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Request(#[from] ureq::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timeout_reports_the_configured_limit() {
        assert_eq!(
            ChatError::IdleTimeout(Duration::from_millis(150)).to_string(),
            "no data received for 150ms"
        );
        assert_eq!(
            ChatError::IdleTimeout(Duration::from_millis(1500)).to_string(),
            "no data received for 1.5s"
        );
        assert_eq!(
            ChatError::IdleTimeout(Duration::from_secs(30)).to_string(),
            "no data received for 30s"
        );
    }
}
