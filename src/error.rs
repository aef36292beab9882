//! Cardcrafter error types

use std::time::Duration;

/// Transport-level failure category for outbound fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Dns => "dns",
            Self::Tls => "tls",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Cardcrafter error types.
///
/// The `Display` output carries raw detail and is meant for server-side logs.
/// Anything shown to a caller goes through [`CardError::safe_message`].
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    // Caller input
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("malformed query: {0}")]
    Query(String),

    #[error("security check failed")]
    Forbidden,

    // Quota
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Upstream / transport
    #[error("network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("blocked target: {0}")]
    BlockedTarget(String),

    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    // Collaborators
    #[error("store error: {0}")]
    Store(String),

    #[error("content store error: {0}")]
    Content(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    // Internal
    /// Encoding or decoding our own values failed. Caller-supplied JSON is
    /// reported as [`InvalidJson`](Self::InvalidJson) instead.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardError {
    /// Caller-facing message with no transport or driver detail.
    pub fn safe_message(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "Invalid URL.",
            Self::InvalidJson(_) => "Invalid JSON from source.",
            Self::Query(_) => "Invalid query parameters.",
            Self::Forbidden => "Security check failed.",
            Self::RateLimited { .. } => "Rate limit exceeded. Please wait.",
            Self::Network { kind, .. } => match kind {
                NetworkErrorKind::Timeout => {
                    "Request timed out. The data source may be temporarily unavailable."
                }
                NetworkErrorKind::Tls => {
                    "Secure connection error. Please verify the URL uses HTTPS."
                }
                _ => "Network connection error. Please try again later.",
            },
            Self::Http { status, .. } => match status {
                404 => "Data source not found. Please verify the URL is correct.",
                401 | 403 => "Access denied to the data source.",
                500 => "The data source is experiencing technical difficulties.",
                502..=504 => "The data source is temporarily unavailable.",
                _ => "Unable to retrieve data from the source.",
            },
            Self::BlockedTarget(_)
            | Self::Store(_)
            | Self::Content(_)
            | Self::Configuration(_)
            | Self::Serialization(_) => "Unable to retrieve data. Please check your data source URL.",
        }
    }

    /// HTTP status an endpoint should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidUrl(_) | Self::InvalidJson(_) | Self::Query(_) => 400,
            Self::Forbidden | Self::BlockedTarget(_) => 403,
            Self::RateLimited { .. } => 429,
            Self::Network { kind, .. } => match kind {
                NetworkErrorKind::Timeout => 504,
                _ => 502,
            },
            Self::Http { .. } => 502,
            Self::Store(_) | Self::Content(_) | Self::Configuration(_) | Self::Serialization(_) => {
                500
            }
        }
    }

    /// Whether a later attempt (e.g. the next refresh sweep) may succeed.
    ///
    /// Caller mistakes and policy rejections are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for Cardcrafter operations
pub type Result<T> = std::result::Result<T, CardError>;
