use std::{fmt, time::Duration};

use opwait_core::BoxedError;
use serde::Deserialize;
use thiserror::Error;

use crate::remote::http::HttpError;

/// A transport-level failure: the refresh or submit call itself did not
/// produce a usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: http::StatusCode,
        /// `error.message` of the Google error envelope, or the raw body.
        message: String,
        /// `error.errors[].reason` values, in payload order.
        reasons: Vec<String>,
        body: String,
    },
    /// Building or sending the request failed (connection, TLS, timeout...).
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The body could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Build a status error from a raw reply body, decoding the Google error
    /// envelope when there is one.
    pub fn from_reply(status: http::StatusCode, body: String) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => TransportError::Status {
                status,
                message: envelope.error.message,
                reasons: envelope
                    .error
                    .errors
                    .into_iter()
                    .filter_map(|e| e.reason)
                    .collect(),
                body,
            },
            Err(_) => TransportError::Status {
                status,
                message: body.clone(),
                reasons: Vec::new(),
                body,
            },
        }
    }

    /// Everything the error carries as text: used for pattern predicates,
    /// which may match either the summary message or the raw body.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        match self {
            TransportError::Status { message, body, .. } => {
                message.contains(needle) || body.contains(needle)
            }
            other => other.to_string().contains(needle),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

/// Numeric (rpc) or symbolic (compute, sql) error code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Number(n) => write!(f, "{n}"),
            ErrorCode::Text(s) => f.write_str(s),
        }
    }
}

/// One `{code, message}` entry of a failed operation's error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
}

/// The structured error payload of a terminal, failed operation.
///
/// Rendered as each entry's message followed by a newline, in payload order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationErrors(pub Vec<StructuredError>);

impl OperationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[StructuredError] {
        &self.0
    }

    pub fn codes(&self) -> impl Iterator<Item = &ErrorCode> {
        self.0.iter().map(|e| &e.code)
    }
}

impl fmt::Display for OperationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0 {
            writeln!(f, "{}", entry.message)?;
        }
        Ok(())
    }
}

/// Crate-level error. Keep variants stable and small.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The operation reached a terminal state but reported a logical failure.
    #[error("error waiting for {activity} (operation {name}): {errors}")]
    OperationFailed {
        activity: String,
        name: String,
        errors: OperationErrors,
    },
    /// The poll loop ran out of time before the operation became terminal.
    ///
    /// `last_error` is the retryable refresh failure still being absorbed
    /// when time ran out; `None` means the operation was merely slow.
    #[error("timed out after {elapsed:?} waiting for {activity} (operation {name}, last status: {last_status})")]
    Timeout {
        activity: String,
        name: String,
        last_status: String,
        elapsed: Duration,
        #[source]
        last_error: Option<TransportError>,
    },
    /// The operation itself disappeared while being polled.
    #[error("operation {name} not found while polling")]
    OperationNotFound {
        name: String,
        #[source]
        source: TransportError,
    },
    /// A retry budget ran out; `source` is the last failure, verbatim.
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
    /// Programmer error detected at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Other(BoxedError),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Coarse classification of a surfaced error, for callers deciding what to
/// tell a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected as invalid; retrying will not help.
    InvalidRequest,
    /// The remote side is unavailable or throttling; try again later.
    Unavailable,
    /// A stale fingerprint was submitted.
    FingerprintConflict,
    OperationFailed,
    Timeout,
    NotFound,
    /// A retry budget ran out. Inspect `source` for what kept failing.
    Exhausted,
    Configuration,
}

impl Error {
    #[inline]
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(Box::new(err))
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// The transport error at the bottom of this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) | Error::OperationNotFound { source: e, .. } => Some(e),
            Error::Timeout { last_error, .. } => last_error.as_ref(),
            Error::RetriesExhausted { source, .. } => source.transport(),
            _ => None,
        }
    }

    /// Classify using [`Classifier::default`](crate::Classifier::default).
    ///
    /// Conflict patterns or statuses added to a custom classifier are not
    /// seen here; use [`Classifier::kind`](crate::Classifier::kind) with the
    /// classifier that produced the error.
    pub fn kind(&self) -> ErrorKind {
        crate::classify::Classifier::default().kind(self)
    }
}
