// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed error taxonomy surfaced to callers.
//!
//! Authorization failures are recovered locally (one coordinated refresh,
//! one replay); everything else propagates to the caller carrying its kind,
//! the original HTTP status when one was received, and a message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of every failure the runtime can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable credential; the caller should prompt a login.
    Unauthenticated,
    /// A token failed local shape validation.
    InvalidCredential,
    /// The refresh exchange itself failed; the session is over.
    RefreshFailed,
    /// A precondition failed before any network activity.
    Validation,
    /// The request exceeded its deadline.
    Timeout,
    /// The transport could not reach the server.
    NetworkUnreachable,
    /// A 5xx response.
    ServerError,
    /// A non-auth 4xx response, or a `success=false` envelope.
    Rejected,
    /// An upload ran out of retry attempts.
    RetriesExhausted,
    /// The caller cancelled the operation.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::Validation => "VALIDATION",
            Self::Timeout => "TIMEOUT",
            Self::NetworkUnreachable => "NETWORK_UNREACHABLE",
            Self::ServerError => "SERVER_ERROR",
            Self::Rejected => "REJECTED",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the request runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status of the response that produced this error, when any.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, status: None, message: message.into() }
    }

    pub fn with_status(kind: ErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self { kind, status: Some(status), message: message.into() }
    }

    /// Whether the upload pipeline may retry after this failure.
    ///
    /// The dispatcher itself never retries on these; retry policy lives in
    /// the upload pipeline alone.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout | ErrorKind::NetworkUnreachable | ErrorKind::ServerError
        )
    }

    /// Translate a transport-level failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorKind::Timeout, "request timed out")
        } else if err.is_connect() {
            Self::new(ErrorKind::NetworkUnreachable, format!("connection failed: {err}"))
        } else {
            Self::new(ErrorKind::NetworkUnreachable, err.to_string())
        }
    }

    /// Translate a non-2xx response status.
    ///
    /// `message` is the server-provided message when the body carried one.
    pub(crate) fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| default_message(status).to_owned());
        match status {
            401 | 403 => Self::with_status(ErrorKind::Unauthenticated, status, message),
            408 => Self::with_status(ErrorKind::Timeout, status, message),
            413 => Self::with_status(ErrorKind::Validation, status, message),
            500..=599 => Self::with_status(ErrorKind::ServerError, status, message),
            _ => Self::with_status(ErrorKind::Rejected, status, message),
        }
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "invalid request",
        401 => "authentication required",
        403 => "access denied",
        404 => "resource not found",
        413 => "payload too large",
        500..=599 => "server error",
        _ => "request failed",
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ApiError {}
