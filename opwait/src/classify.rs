//! Error classification: transient vs. conflict vs. fatal.
//!
//! Conflict detection is a substring match on the error text of a 412 reply
//! because the remote API has no structured code for a stale fingerprint. The
//! pattern list is data, not code: extend it with
//! [`Classifier::with_conflict_pattern`] and pin it with characterization
//! tests against recorded error payloads.

use std::{borrow::Cow, error::Error as StdError, io};

use serde::Deserialize;

use crate::{
    error::{Error, ErrorCode, ErrorKind, OperationErrors, StructuredError, TransportError},
    predicates::{self, RetryPredicate},
    remote::http::HttpError,
};

/// Messages the API uses for a stale fingerprint.
pub const FINGERPRINT_CONFLICT_PATTERNS: &[&str] = &[
    "Invalid fingerprint.",
    "Supplied fingerprint does not match current metadata fingerprint.",
];

/// Classification used to guide retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Lost an optimistic-concurrency race; redo the read-modify-write.
    DurableConflict,
    /// Transient; the same request may succeed later.
    RetryTransient,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    predicates: Vec<RetryPredicate>,
    conflict_patterns: Vec<Cow<'static, str>>,
    conflict_status: Option<http::StatusCode>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            predicates: predicates::defaults(),
            conflict_patterns: FINGERPRINT_CONFLICT_PATTERNS
                .iter()
                .map(|p| Cow::Borrowed(*p))
                .collect(),
            conflict_status: Some(http::StatusCode::PRECONDITION_FAILED),
        }
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the built-in network and status checks, no body predicates.
    pub fn bare() -> Self {
        Self {
            predicates: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_predicates(mut self, predicates: impl IntoIterator<Item = RetryPredicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn with_conflict_pattern(mut self, pattern: impl Into<Cow<'static, str>>) -> Self {
        self.conflict_patterns.push(pattern.into());
        self
    }

    /// Status a transport error must carry to count as a conflict. Defaults
    /// to 412; `None` matches the patterns under any status.
    pub fn with_conflict_status(mut self, status: Option<http::StatusCode>) -> Self {
        self.conflict_status = status;
        self
    }

    /// Why `err` is transient, or `None` when it is not.
    pub fn retry_reason(&self, err: &Error) -> Option<Cow<'static, str>> {
        match err {
            Error::Transport(transport) => self.transport_retry_reason(transport),
            _ => None,
        }
    }

    pub fn is_retryable(&self, err: &Error) -> bool {
        self.retry_reason(err).is_some()
    }

    pub fn transport_retry_reason(&self, err: &TransportError) -> Option<Cow<'static, str>> {
        match err {
            TransportError::Status { status, .. } => {
                let code = status.as_u16();
                if code == 429 || status.is_server_error() {
                    return Some(Cow::Owned(format!("Retryable error code {code}")));
                }
            }
            TransportError::Http(http) => {
                if let Some(reason) = network_retry_reason(http) {
                    return Some(Cow::Borrowed(reason));
                }
            }
            TransportError::Decode(_) => return None,
        }
        self.predicates.iter().find_map(|p| p.check(err))
    }

    pub fn is_fingerprint_conflict(&self, err: &Error) -> bool {
        match err {
            Error::Transport(transport) => {
                let status_matches = match self.conflict_status {
                    Some(expected) => transport.status() == Some(expected.as_u16()),
                    None => true,
                };
                status_matches && self.conflict_patterns.iter().any(|p| transport.matches(p))
            }
            Error::Other(other) => {
                let text = other.to_string();
                self.conflict_patterns.iter().any(|p| text.contains(p.as_ref()))
            }
            _ => false,
        }
    }

    pub fn classify(&self, err: &Error) -> RetryClass {
        if self.is_fingerprint_conflict(err) {
            RetryClass::DurableConflict
        } else if self.is_retryable(err) {
            RetryClass::RetryTransient
        } else {
            RetryClass::Fatal
        }
    }

    pub fn kind(&self, err: &Error) -> ErrorKind {
        match err {
            Error::OperationFailed { .. } => ErrorKind::OperationFailed,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::OperationNotFound { .. } => ErrorKind::NotFound,
            Error::RetriesExhausted { .. } => ErrorKind::Exhausted,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Transport(_) | Error::Other(_) => match self.classify(err) {
                RetryClass::DurableConflict => ErrorKind::FingerprintConflict,
                RetryClass::RetryTransient => ErrorKind::Unavailable,
                RetryClass::Fatal => ErrorKind::InvalidRequest,
            },
        }
    }
}

const CONNECTION_RESET_SUFFIX: &str = ": connection reset by peer";

fn network_retry_reason(err: &HttpError) -> Option<&'static str> {
    if let Some(reason) = client_reason(err) {
        return Some(reason);
    }
    if err.to_string().ends_with(CONNECTION_RESET_SUFFIX) {
        return Some("reset connection error");
    }
    if let HttpError::Io(io_err) = err {
        return io_reason(io_err.kind());
    }
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            return io_reason(io_err.kind());
        }
        source = current.source();
    }
    None
}

#[cfg(feature = "tokio-http")]
fn client_reason(err: &HttpError) -> Option<&'static str> {
    match err {
        HttpError::Reqwest(e) if e.is_timeout() => Some("marked as timeout"),
        HttpError::Reqwest(e) if e.is_connect() => Some("connection failed"),
        _ => None,
    }
}

#[cfg(not(feature = "tokio-http"))]
fn client_reason(_: &HttpError) -> Option<&'static str> {
    None
}

fn io_reason(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            Some("marked as timeout")
        }
        io::ErrorKind::UnexpectedEof => Some("Got unexpected EOF"),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Some("reset connection error"),
        _ => None,
    }
}

/// Error payload of a terminal operation, in either of the wire shapes the
/// APIs use.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// A single rpc status `{"code": 3, "message": ".."}` (long-running ops,
    /// container). Tried first: it is the only shape with a top-level code.
    Status {
        code: ErrorCode,
        #[serde(default)]
        message: String,
    },
    /// `{"errors": [{"code": .., "message": ..}, ..]}` (compute, sql admin).
    List {
        #[serde(default)]
        errors: Vec<ErrorEntry>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEntry {
    #[serde(default = "unknown_code")]
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

fn unknown_code() -> ErrorCode {
    ErrorCode::Text(String::new())
}

/// Decode a terminal operation's error payload. `None` when the payload is
/// absent or carries no entries.
pub fn extract_structured_error(payload: Option<&ErrorPayload>) -> Option<OperationErrors> {
    let entries: Vec<StructuredError> = match payload? {
        ErrorPayload::List { errors } => errors
            .iter()
            .map(|e| StructuredError {
                code: e.code.clone(),
                message: e.message.clone(),
            })
            .collect(),
        ErrorPayload::Status { code, message } => {
            if *code == ErrorCode::Number(0) && message.is_empty() {
                Vec::new()
            } else {
                vec![StructuredError {
                    code: code.clone(),
                    message: message.clone(),
                }]
            }
        }
    };
    (!entries.is_empty()).then_some(OperationErrors(entries))
}
