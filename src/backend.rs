//! Typed error taxonomy for backend calls, plus retry classification.
//!
//! The data-access client produces `BackendError` values with a closed set of
//! kinds, so retry eligibility dispatches on an enum instead of probing
//! unknown error shapes for `code`/`status` fields. Codes are normalized to
//! strings at construction, so numeric HTTP statuses and string codes
//! classify identically.

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Closed set of backend failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Connection-level failure (DNS, TCP, TLS, reset).
    Network,
    /// The backend did not respond in time.
    Timeout,
    /// The request was malformed or failed validation.
    BadRequest,
    /// Missing or invalid credentials (HTTP 401).
    Auth,
    /// Authenticated but not allowed (HTTP 403).
    Permission,
    /// The addressed resource does not exist.
    NotFound,
    /// The request conflicts with current state.
    Conflict,
    /// The backend asked us to slow down (HTTP 429).
    RateLimited,
    /// Backend-side failure (HTTP 5xx and unclassified statuses).
    Internal,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::BadRequest => "bad_request",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error produced by the backend data-access client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("backend call failed ({kind}): {message}")]
pub struct BackendError {
    kind: BackendErrorKind,
    code: Option<String>,
    message: String,
}

impl BackendError {
    /// Create an error with a kind and human-readable message.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self { kind, code: None, message: message.into() }
    }

    /// Attach a backend-specific code; normalized to a string.
    pub fn with_code(mut self, code: impl fmt::Display) -> Self {
        self.code = Some(code.to_string());
        self
    }

    /// Classify an HTTP status into a kind, recording the status as the code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 | 422 => BackendErrorKind::BadRequest,
            401 => BackendErrorKind::Auth,
            403 => BackendErrorKind::Permission,
            404 => BackendErrorKind::NotFound,
            408 => BackendErrorKind::Timeout,
            409 => BackendErrorKind::Conflict,
            429 => BackendErrorKind::RateLimited,
            _ => BackendErrorKind::Internal,
        };
        Self::new(kind, message).with_code(status)
    }

    /// Failure kind.
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    /// Normalized code string, if one was recorded.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Configurable allow/deny classification of retryable backend errors.
///
/// The default filter denies authentication/authorization failures and a
/// fixed set of permanent client-error codes: retrying those wastes attempts
/// and delays surfacing a non-transient failure. Everything else is
/// retryable. An allow-listed code overrides both deny lists.
#[derive(Debug, Clone)]
pub struct RetryFilter {
    denied_kinds: HashSet<BackendErrorKind>,
    denied_codes: HashSet<String>,
    allowed_codes: HashSet<String>,
}

impl Default for RetryFilter {
    fn default() -> Self {
        let denied_kinds = [
            BackendErrorKind::Auth,
            BackendErrorKind::Permission,
            BackendErrorKind::BadRequest,
            BackendErrorKind::NotFound,
            BackendErrorKind::Conflict,
        ]
        .into_iter()
        .collect();
        let denied_codes =
            ["400", "401", "403", "404", "409", "422"].into_iter().map(String::from).collect();
        Self { denied_kinds, denied_codes, allowed_codes: HashSet::new() }
    }
}

impl RetryFilter {
    /// A filter that retries everything.
    pub fn permissive() -> Self {
        Self {
            denied_kinds: HashSet::new(),
            denied_codes: HashSet::new(),
            allowed_codes: HashSet::new(),
        }
    }

    /// Mark a kind as non-retryable.
    pub fn deny_kind(mut self, kind: BackendErrorKind) -> Self {
        self.denied_kinds.insert(kind);
        self
    }

    /// Mark a code as non-retryable; normalized to a string.
    pub fn deny_code(mut self, code: impl fmt::Display) -> Self {
        self.denied_codes.insert(code.to_string());
        self
    }

    /// Force a code to be retryable, overriding both deny lists.
    pub fn allow_code(mut self, code: impl fmt::Display) -> Self {
        self.allowed_codes.insert(code.to_string());
        self
    }

    /// Decide whether an error is worth retrying.
    pub fn is_retryable(&self, error: &BackendError) -> bool {
        if let Some(code) = error.code() {
            if self.allowed_codes.contains(code) {
                return true;
            }
            if self.denied_codes.contains(code) {
                return false;
            }
        }
        !self.denied_kinds.contains(&error.kind())
    }

    /// Convert into a `should_retry` predicate for a retry policy or guard.
    pub fn into_predicate(self) -> impl Fn(&BackendError) -> bool + Send + Sync + 'static {
        move |error| self.is_retryable(error)
    }
}
