//! Error types for the OrbitTrack client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::StoreError;

/// Main error type for OrbitTrack operations.
#[derive(Error, Debug)]
pub enum OrbitTrackError {
    /// Login was rejected or the login endpoint could not be reached.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The session was refreshed once and the remote still rejected it.
    #[error("Session expired and re-authentication was rejected again (status {status})")]
    SessionExpiredRetryExhausted { status: u16 },

    /// The local rate limiter has no headroom and waiting is not allowed.
    #[error(
        "Rate limit exceeded for {}: retry after {}s",
        format_windows(.windows),
        .retry_after.as_secs()
    )]
    RateLimitExceeded {
        windows: Vec<ExhaustedWindow>,
        retry_after: Duration,
    },

    /// The remote service rejected the request with its own throttling.
    #[error("Rate limited by Space-Track (status {status})")]
    RemoteRateLimitExceeded {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },

    /// The quota store could not be consulted, so the request was refused.
    #[error("Rate limiter unavailable: {0}")]
    RateLimiterUnavailable(#[source] StoreError),

    /// Network failure or a non-success HTTP status.
    #[error(
        "Transport error{}: {message}",
        .status.map(|s| format!(" (status {s})")).unwrap_or_default()
    )]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The payload did not match the requested record shape.
    #[error("Failed to decode {shape}: {source}")]
    Decode {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A rate window literal could not be parsed.
    #[error("Invalid rate window '{0}'")]
    InvalidRateWindow(String),

    /// A rate window is looser than the documented Space-Track allowance.
    #[error("Rate limit {requested} exceeds the allowed ceiling of {ceiling}")]
    RateLimitAboveCeiling { requested: String, ceiling: String },

    /// The query could not be built from the given arguments.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One window that had no headroom when a no-wait acquisition failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustedWindow {
    pub name: String,
    pub retry_after: Duration,
}

impl fmt::Display for ExhaustedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}s)", self.name, self.retry_after.as_secs())
    }
}

fn format_windows(windows: &[ExhaustedWindow]) -> String {
    windows
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse classification of an error from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Wait and try again; see [`OrbitTrackError::retry_after`].
    TryLater,
    /// Credentials, arguments or expected record shape need fixing.
    FixInput,
    /// Store, network or remote service trouble.
    Infrastructure,
}

impl OrbitTrackError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimitExceeded { .. } | Self::RemoteRateLimitExceeded { .. } => {
                ErrorCategory::TryLater
            }
            Self::Authentication(_)
            | Self::SessionExpiredRetryExhausted { .. }
            | Self::Decode { .. }
            | Self::InvalidRateWindow(_)
            | Self::RateLimitAboveCeiling { .. }
            | Self::InvalidRequest(_)
            | Self::Config(_) => ErrorCategory::FixInput,
            Self::RateLimiterUnavailable(_) | Self::Transport { .. } | Self::Io(_) => {
                ErrorCategory::Infrastructure
            }
        }
    }

    /// How long to wait before the request can succeed, if known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            Self::RemoteRateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for OrbitTrack operations.
pub type Result<T> = std::result::Result<T, OrbitTrackError>;
