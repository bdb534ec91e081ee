use std::future::Future;

use bytes::Bytes;
use opwait_core::MaybeSend;

use super::{
    ComputeOperation, ComputeOperationHandle, ContainerOperation, ContainerOperationHandle,
    LongRunningOperation, LroOperationHandle, OperationHandle, OperationStatus, Snapshot,
    SqlAdminOperation, SqlAdminOperationHandle,
};
use crate::{
    error::{Error, OperationErrors, Result, TransportError},
    remote::{http::HttpClient, ApiClient},
};

/// The operation reference a triggering call returned, tagged by shape.
#[derive(Debug, Clone)]
pub enum OperationRef {
    Compute(Snapshot<ComputeOperation>),
    SqlAdmin(Snapshot<SqlAdminOperation>),
    Container(Snapshot<ContainerOperation>),
    LongRunning {
        base_url: String,
        snapshot: Snapshot<LongRunningOperation>,
    },
}

impl From<Snapshot<ComputeOperation>> for OperationRef {
    fn from(snapshot: Snapshot<ComputeOperation>) -> Self {
        OperationRef::Compute(snapshot)
    }
}

impl From<Snapshot<SqlAdminOperation>> for OperationRef {
    fn from(snapshot: Snapshot<SqlAdminOperation>) -> Self {
        OperationRef::SqlAdmin(snapshot)
    }
}

impl From<Snapshot<ContainerOperation>> for OperationRef {
    fn from(snapshot: Snapshot<ContainerOperation>) -> Self {
        OperationRef::Container(snapshot)
    }
}

/// One handle over every supported shape.
#[derive(Debug, Clone)]
pub enum AnyOperation<C> {
    Compute(ComputeOperationHandle<C>),
    SqlAdmin(SqlAdminOperationHandle<C>),
    Container(ContainerOperationHandle<C>),
    LongRunning(LroOperationHandle<C>),
}

impl<C> AnyOperation<C>
where
    C: HttpClient,
{
    /// Select the adapter for `op`. A missing reference is a programming
    /// error and fails with [`Error::Configuration`]. Compute and container
    /// scopes come from the operation itself.
    pub fn new(api: ApiClient<C>, project: &str, op: Option<OperationRef>) -> Result<Self> {
        let op = op.ok_or_else(|| Error::configuration("cannot wait on a missing operation"))?;
        Ok(match op {
            OperationRef::Compute(snapshot) => {
                AnyOperation::Compute(ComputeOperationHandle::derived(api, project, snapshot)?)
            }
            OperationRef::SqlAdmin(snapshot) => {
                AnyOperation::SqlAdmin(SqlAdminOperationHandle::new(api, project, snapshot)?)
            }
            OperationRef::Container(snapshot) => {
                AnyOperation::Container(ContainerOperationHandle::derived(api, project, snapshot)?)
            }
            OperationRef::LongRunning { base_url, snapshot } => {
                AnyOperation::LongRunning(LroOperationHandle::new(api, &base_url, snapshot)?)
            }
        })
    }
}

macro_rules! each {
    ($self:expr, $h:ident => $body:expr) => {
        match $self {
            AnyOperation::Compute($h) => $body,
            AnyOperation::SqlAdmin($h) => $body,
            AnyOperation::Container($h) => $body,
            AnyOperation::LongRunning($h) => $body,
        }
    };
}

impl<C> OperationHandle for AnyOperation<C>
where
    C: HttpClient,
{
    fn name(&self) -> &str {
        each!(self, h => h.name())
    }

    fn status(&self) -> OperationStatus {
        each!(self, h => h.status())
    }

    fn raw_status(&self) -> &str {
        each!(self, h => h.raw_status())
    }

    fn result_error(&self) -> Option<OperationErrors> {
        each!(self, h => h.result_error())
    }

    fn raw_response(&self) -> &Bytes {
        each!(self, h => h.raw_response())
    }

    fn refresh(&self) -> impl Future<Output = Result<Self, TransportError>> + MaybeSend {
        async move {
            Ok(match self {
                AnyOperation::Compute(h) => AnyOperation::Compute(h.refresh().await?),
                AnyOperation::SqlAdmin(h) => AnyOperation::SqlAdmin(h.refresh().await?),
                AnyOperation::Container(h) => AnyOperation::Container(h.refresh().await?),
                AnyOperation::LongRunning(h) => AnyOperation::LongRunning(h.refresh().await?),
            })
        }
    }
}
