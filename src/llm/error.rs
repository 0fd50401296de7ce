//! Transport error types

use thiserror::Error;

/// Message used whenever a success response carries no usable reply.
pub const NO_VALID_REPLY: &str = "no valid reply";

/// Error raised by the transport client
///
/// Cloneable so it can travel inside state machine events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status code, when the failure came from a response
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Remote, message)
    }

    pub fn no_valid_reply() -> Self {
        Self::new(ApiErrorKind::MalformedResponse, NO_VALID_REPLY)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unknown, message)
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// The message carries the status line and, when present, the body.
    pub fn from_status(status: u16, reason: Option<&str>, body: &str) -> Self {
        let mut message = format!("API request failed: {status}");
        if let Some(reason) = reason {
            message.push(' ');
            message.push_str(reason);
        }
        let body = body.trim();
        if !body.is_empty() {
            message.push_str(" - ");
            message.push_str(body);
        }
        Self::new(ApiErrorKind::from_status(status), message).with_status(status)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() {
            ApiErrorKind::Network
        } else if e.is_decode() {
            ApiErrorKind::MalformedResponse
        } else {
            ApiErrorKind::Unknown
        };
        let mut err = Self::new(kind, e.to_string());
        err.status = e.status().map(|s| s.as_u16());
        err
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection refused, DNS, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400, 404, 422, ...)
    InvalidRequest,
    /// The endpoint answered with a GraphQL error list
    Remote,
    /// Success status but no usable reply field
    MalformedResponse,
    /// Unknown error
    Unknown,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            400..=499 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}
