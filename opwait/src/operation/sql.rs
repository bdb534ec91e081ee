use std::future::Future;

use bytes::Bytes;
use opwait_core::MaybeSend;
use serde::Deserialize;

use super::{require, terminal_errors, OperationHandle, OperationStatus, Snapshot};
use crate::{
    classify::ErrorPayload,
    config::Service,
    error::{OperationErrors, Result, TransportError},
    remote::{http::HttpClient, ApiClient},
};

/// Cloud SQL Admin operation resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlAdminOperation {
    pub name: String,
    /// `PENDING`, `RUNNING`, `DONE` or `SQL_OPERATION_STATUS_UNSPECIFIED`.
    #[serde(default)]
    pub status: String,
    pub operation_type: Option<String>,
    pub target_id: Option<String>,
    pub target_link: Option<String>,
    pub self_link: Option<String>,
    pub error: Option<ErrorPayload>,
}

/// Adapter for Cloud SQL Admin operations, addressed by project only.
#[derive(Debug, Clone)]
pub struct SqlAdminOperationHandle<C> {
    api: ApiClient<C>,
    project: String,
    snapshot: Snapshot<SqlAdminOperation>,
}

impl<C> SqlAdminOperationHandle<C>
where
    C: HttpClient,
{
    pub fn new(
        api: ApiClient<C>,
        project: impl Into<String>,
        snapshot: Snapshot<SqlAdminOperation>,
    ) -> Result<Self> {
        let project = project.into();
        require("project", &project)?;
        require("operation name", &snapshot.op().name)?;
        Ok(Self {
            api,
            project,
            snapshot,
        })
    }

    pub fn operation(&self) -> &SqlAdminOperation {
        self.snapshot.op()
    }
}

impl<C> OperationHandle for SqlAdminOperationHandle<C>
where
    C: HttpClient,
{
    fn name(&self) -> &str {
        &self.snapshot.op().name
    }

    fn status(&self) -> OperationStatus {
        OperationStatus::from_wire(&self.snapshot.op().status)
    }

    fn raw_status(&self) -> &str {
        &self.snapshot.op().status
    }

    fn result_error(&self) -> Option<OperationErrors> {
        terminal_errors(self.status(), self.snapshot.op().error.as_ref())
    }

    fn raw_response(&self) -> &Bytes {
        self.snapshot.raw()
    }

    fn refresh(&self) -> impl Future<Output = Result<Self, TransportError>> + MaybeSend {
        async move {
            let url = self.api.service_url(
                Service::SqlAdmin,
                &["projects", &self.project, "operations", self.name()],
            )?;
            let (op, raw) = self.api.get_json(&url).await?;
            Ok(Self {
                api: self.api.clone(),
                project: self.project.clone(),
                snapshot: Snapshot::new(op, raw),
            })
        }
    }
}
