//! Waits on remote long-running operations and retries fingerprint-guarded
//! read-modify-write updates.
//!
//! A mutating call against a control-plane API returns either a result or an
//! operation reference. [`OperationPoller`] drives such a reference to a
//! terminal state through one of the [`operation`] adapters, while
//! [`FingerprintRetryWrapper`] re-runs a read-modify-write cycle whenever the
//! server rejects a stale fingerprint. Both suspend only through an injected
//! [`Timer`], so they run unchanged on tokio, on a blocked thread, or on a
//! virtual clock.
//!
//! # Example
//! ```no_run
//! use opwait::{
//!     operation::{ComputeOperation, ComputeOperationHandle, Snapshot},
//!     remote::{http::HttpClient, ApiClient},
//!     BlockingSleeper, OperationPoller, PollOptions, Result, Service,
//! };
//!
//! async fn create_disk<C: HttpClient>(api: ApiClient<C>, disk: &serde_json::Value) -> Result<()> {
//!     let url = api.service_url(
//!         Service::Compute,
//!         &["projects", "my-project", "zones", "us-central1-a", "disks"],
//!     )?;
//!     let (op, raw) = api
//!         .send_json::<ComputeOperation, _>(http::Method::POST, &url, disk)
//!         .await?;
//!     let handle =
//!         ComputeOperationHandle::zonal(api, "my-project", "us-central1-a", Snapshot::new(op, raw))?;
//!
//!     let poller = OperationPoller::new(BlockingSleeper, PollOptions::default())?;
//!     poller.wait(handle, "Creating Disk").await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod classify;
mod config;
mod error;
pub mod fingerprint;
pub mod operation;
mod options;
mod poller;
pub mod predicates;
pub mod remote;
pub mod retry;

pub use backoff::{BackoffPolicy, BackoffSchedule};
pub use classify::{Classifier, RetryClass};
pub use config::{
    Builder as ClientConfigBuilder, ClientConfig, Service, COMPUTE_BASE_URL, CONTAINER_BASE_URL,
    DEFAULT_USER_AGENT, SQL_ADMIN_BASE_URL,
};
pub use error::{
    Error, ErrorCode, ErrorKind, OperationErrors, Result, StructuredError, TransportError,
};
pub use fingerprint::{Fingerprint, FingerprintRetryWrapper, Versioned};
pub use operation::{AnyOperation, OperationHandle, OperationRef, OperationStatus};
pub use options::{PollOptions, RetryBudget, RetryOptions};
#[cfg(feature = "tokio")]
pub use opwait_core::TokioTimer;
pub use opwait_core::{BlockingSleeper, ManualTimer, NoopTimer, Timer};
pub use poller::OperationPoller;
pub use retry::{retry_time_duration, RetryRunner};
