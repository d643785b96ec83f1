//! Exchange error types.
//!
//! Every failure of a single model call is classified into an
//! [`ExchangeErrorKind`] so the controller can report it without ever
//! letting it escape the session.

use std::time::Duration;

use thiserror::Error;

/// A failed model exchange.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExchangeError {
    pub kind: ExchangeErrorKind,
    pub message: String,
}

impl ExchangeError {
    pub fn new(kind: ExchangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ExchangeErrorKind::Timeout,
            format!("no reply within {}s", after.as_secs()),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Quota, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::InvalidRequest, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Server, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Malformed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Unknown, message)
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ExchangeErrorKind::Timeout, format!("Request timeout: {err}"))
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else if err.is_body() || err.is_decode() {
            Self::network(format!("Failed to read response: {err}"))
        } else {
            Self::unknown(format!("Request failed: {err}"))
        }
    }
}

/// Error classification for exchange failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    /// The exchange did not finish within its deadline.
    Timeout,
    /// Connection or transport failure.
    Network,
    /// Credential rejected (401, 403, or an invalid key report).
    Auth,
    /// Rate limit or quota exhausted (429).
    Quota,
    /// Request rejected by the provider (400).
    InvalidRequest,
    /// Provider-side failure (5xx).
    Server,
    /// Response could not be decoded.
    Malformed,
    Unknown,
}

impl ExchangeErrorKind {
    /// Stable lowercase label used in logs and API payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::InvalidRequest => "invalid_request",
            Self::Server => "server",
            Self::Malformed => "malformed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ExchangeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
