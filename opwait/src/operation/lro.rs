use std::future::Future;

use bytes::Bytes;
use opwait_core::MaybeSend;
use serde::Deserialize;

use super::{require, terminal_errors, OperationHandle, OperationStatus, Snapshot};
use crate::{
    classify::ErrorPayload,
    config::normalize_base,
    error::{OperationErrors, Result, TransportError},
    remote::{api::join_segments, http::HttpClient, ApiClient},
};

/// `google.longrunning.Operation`, used by most newer APIs.
#[derive(Debug, Clone, Deserialize)]
pub struct LongRunningOperation {
    /// Fully qualified, e.g. `projects/p/locations/l/operations/operation-1`.
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<ErrorPayload>,
    pub metadata: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
}

/// Adapter for `done`-flag operations. The operation name is fully
/// qualified, so only the service's base URL is needed to re-query it.
#[derive(Debug, Clone)]
pub struct LroOperationHandle<C> {
    api: ApiClient<C>,
    base_url: String,
    snapshot: Snapshot<LongRunningOperation>,
}

impl<C> LroOperationHandle<C>
where
    C: HttpClient,
{
    /// `base_url` is the service root, e.g.
    /// `https://alloydb.googleapis.com/v1/`.
    pub fn new(
        api: ApiClient<C>,
        base_url: &str,
        snapshot: Snapshot<LongRunningOperation>,
    ) -> Result<Self> {
        let base_url = normalize_base(base_url)?;
        require("operation name", &snapshot.op().name)?;
        Ok(Self {
            api,
            base_url,
            snapshot,
        })
    }

    pub fn operation(&self) -> &LongRunningOperation {
        self.snapshot.op()
    }

    /// The `response` of a successfully finished operation.
    pub fn response(&self) -> Option<&serde_json::Value> {
        if self.is_terminal() {
            self.snapshot.op().response.as_ref()
        } else {
            None
        }
    }
}

impl<C> OperationHandle for LroOperationHandle<C>
where
    C: HttpClient,
{
    fn name(&self) -> &str {
        &self.snapshot.op().name
    }

    fn status(&self) -> OperationStatus {
        if self.snapshot.op().done {
            OperationStatus::Done
        } else {
            OperationStatus::Running
        }
    }

    fn raw_status(&self) -> &str {
        if self.snapshot.op().done {
            "done"
        } else {
            "not done"
        }
    }

    fn result_error(&self) -> Option<OperationErrors> {
        terminal_errors(self.status(), self.snapshot.op().error.as_ref())
    }

    fn raw_response(&self) -> &Bytes {
        self.snapshot.raw()
    }

    fn refresh(&self) -> impl Future<Output = Result<Self, TransportError>> + MaybeSend {
        async move {
            let segments: Vec<&str> = self
                .name()
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            let url = join_segments(&self.base_url, &segments)?;
            let (op, raw) = self.api.get_json(&url).await?;
            Ok(Self {
                api: self.api.clone(),
                base_url: self.base_url.clone(),
                snapshot: Snapshot::new(op, raw),
            })
        }
    }
}
