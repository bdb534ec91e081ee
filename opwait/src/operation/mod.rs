//! Normalized views over the remote operation shapes.
//!
//! Every sub-API reports progress differently: compute, sql admin and
//! container operations carry an enumerated `status`, while the newer
//! long-running-operation APIs expose a boolean `done`. Each shape gets one
//! adapter implementing [`OperationHandle`]; [`AnyOperation`] picks the right
//! adapter for an [`OperationRef`] returned by a triggering call.

mod any;
mod compute;
mod container;
mod lro;
mod sql;

use std::{fmt, future::Future};

pub use any::{AnyOperation, OperationRef};
use bytes::Bytes;
pub use compute::{ComputeOperation, ComputeOperationHandle, ComputeScope};
pub use container::{ContainerOperation, ContainerOperationHandle};
pub use lro::{LongRunningOperation, LroOperationHandle};
use opwait_core::{MaybeSend, MaybeSync};
use serde::de::DeserializeOwned;
pub use sql::{SqlAdminOperation, SqlAdminOperationHandle};

use crate::{
    classify::{extract_structured_error, ErrorPayload},
    error::{Error, OperationErrors, Result, TransportError},
};

/// Unified lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

impl OperationStatus {
    /// Fold an enumerated wire status. Only `DONE` is terminal.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "DONE" => OperationStatus::Done,
            "RUNNING" | "ABORTING" => OperationStatus::Running,
            _ => OperationStatus::Pending,
        }
    }

    pub fn is_done(self) -> bool {
        self == OperationStatus::Done
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Done => "DONE",
        })
    }
}

/// A normalized, immutable view of one remote operation as last observed.
///
/// A handle is never updated in place: [`refresh`](Self::refresh) returns a
/// whole new handle built from a single "get operation" call.
pub trait OperationHandle: Sized + MaybeSend + MaybeSync {
    /// Identifier used to re-query the operation.
    fn name(&self) -> &str;

    fn status(&self) -> OperationStatus;

    /// The status as the API reported it, for diagnostics.
    fn raw_status(&self) -> &str;

    fn is_terminal(&self) -> bool {
        self.status().is_done()
    }

    /// The logical failure of a terminal operation. Always `None` while the
    /// operation is still in flight.
    fn result_error(&self) -> Option<OperationErrors>;

    /// Last full response body.
    fn raw_response(&self) -> &Bytes;

    /// Issue exactly one "get operation" call. Transport failures are
    /// returned as is; deciding whether to retry is up to the caller.
    fn refresh(&self) -> impl Future<Output = Result<Self, TransportError>> + MaybeSend;
}

/// A decoded operation resource together with the bytes it came from.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    op: T,
    raw: Bytes,
}

impl<T> Snapshot<T> {
    pub fn new(op: T, raw: Bytes) -> Self {
        Self { op, raw }
    }

    pub fn op(&self) -> &T {
        &self.op
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_parts(self) -> (T, Bytes) {
        (self.op, self.raw)
    }
}

impl<T> Snapshot<T>
where
    T: DeserializeOwned,
{
    pub fn decode(raw: impl Into<Bytes>) -> Result<Self, TransportError> {
        let raw = raw.into();
        let op = serde_json::from_slice(&raw)?;
        Ok(Self { op, raw })
    }
}

/// Structured errors only count once the operation is terminal.
pub(crate) fn terminal_errors(
    status: OperationStatus,
    payload: Option<&ErrorPayload>,
) -> Option<OperationErrors> {
    if !status.is_done() {
        return None;
    }
    extract_structured_error(payload)
}

pub(crate) fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::configuration(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Trailing path segment of a self link, or the value itself when it is
/// already a bare name.
pub(crate) fn last_segment(link: &str) -> &str {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(link)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("DONE", OperationStatus::Done)]
    #[case("RUNNING", OperationStatus::Running)]
    #[case("PENDING", OperationStatus::Pending)]
    #[case("SQL_OPERATION_STATUS_UNSPECIFIED", OperationStatus::Pending)]
    #[case("done", OperationStatus::Pending)]
    #[case("", OperationStatus::Pending)]
    fn only_done_is_terminal(#[case] wire: &str, #[case] expected: OperationStatus) {
        assert_eq!(OperationStatus::from_wire(wire), expected);
    }

    #[test]
    fn errors_are_hidden_until_terminal() {
        let payload: ErrorPayload =
            serde_json::from_str(r#"{"errors": [{"code": "X", "message": "boom"}]}"#).unwrap();
        assert!(terminal_errors(OperationStatus::Running, Some(&payload)).is_none());
        assert_eq!(
            terminal_errors(OperationStatus::Done, Some(&payload))
                .unwrap()
                .to_string(),
            "boom\n"
        );
    }

    #[rstest]
    #[case(
        "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
        "us-central1-a"
    )]
    #[case("projects/p/regions/europe-west1/", "europe-west1")]
    #[case("us-east1", "us-east1")]
    fn self_link_names(#[case] link: &str, #[case] name: &str) {
        assert_eq!(last_segment(link), name);
    }
}
