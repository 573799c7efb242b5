//! Errors from the task-status and instruction services.

use std::fmt;
use thiserror::Error;

/// Classification of a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The task does not exist (HTTP 404/410 or an equivalent rejection).
    NotFound,
    RateLimited,
    ServerError,
    ClientError,
    NetworkError,
    ParseError,
    /// The service answered `success: false` for another reason.
    Rejected,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::ClientError => "client error",
            Self::NetworkError => "network error",
            Self::ParseError => "parse error",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> ApiErrorKind {
    match status {
        404 | 410 => ApiErrorKind::NotFound,
        429 => ApiErrorKind::RateLimited,
        400..=499 => ApiErrorKind::ClientError,
        _ => ApiErrorKind::ServerError,
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    /// A non-2xx response. A 4xx body saying the task does not exist is
    /// not-found whatever the exact status code.
    pub fn http(status_code: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        let kind = match classify_http_status(status_code) {
            ApiErrorKind::ClientError if mentions_not_found(&message) => ApiErrorKind::NotFound,
            kind => kind,
        };
        Self {
            kind,
            message,
            status_code: Some(status_code),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NetworkError, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ParseError, message)
    }

    /// A `success: false` response. Messages that say the task does not
    /// exist are classified as not-found.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if mentions_not_found(&message) {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Rejected
        };
        Self::new(kind, message)
    }

    /// Not-found is the only terminal failure; everything else is retried
    /// on the next poll.
    pub fn is_terminal(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }
}

fn mentions_not_found(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("not_found")
}
