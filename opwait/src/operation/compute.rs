use std::future::Future;

use bytes::Bytes;
use opwait_core::MaybeSend;
use serde::Deserialize;

use super::{last_segment, require, terminal_errors, OperationHandle, OperationStatus, Snapshot};
use crate::{
    classify::ErrorPayload,
    config::Service,
    error::{OperationErrors, Result, TransportError},
    remote::{http::HttpClient, ApiClient},
};

/// Compute Engine operation resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOperation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Self link of the zone, for zonal operations.
    pub zone: Option<String>,
    /// Self link of the region, for regional operations.
    pub region: Option<String>,
    pub operation_type: Option<String>,
    pub target_link: Option<String>,
    pub self_link: Option<String>,
    pub progress: Option<u32>,
    pub status_message: Option<String>,
    pub error: Option<ErrorPayload>,
}

/// Where a compute operation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeScope {
    Global,
    Region(String),
    Zone(String),
}

impl ComputeScope {
    /// Zone first, then region, else global.
    pub fn of(op: &ComputeOperation) -> Self {
        let non_empty = |link: &Option<String>| {
            link.as_deref()
                .map(last_segment)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        if let Some(zone) = non_empty(&op.zone) {
            ComputeScope::Zone(zone)
        } else if let Some(region) = non_empty(&op.region) {
            ComputeScope::Region(region)
        } else {
            ComputeScope::Global
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ComputeScope::Global => Ok(()),
            ComputeScope::Region(region) => require("region", region),
            ComputeScope::Zone(zone) => require("zone", zone),
        }
    }

    fn segments<'a>(&'a self, project: &'a str, name: &'a str) -> Vec<&'a str> {
        let mut segments = vec!["projects", project];
        match self {
            ComputeScope::Global => segments.push("global"),
            ComputeScope::Region(region) => segments.extend(["regions", region.as_str()]),
            ComputeScope::Zone(zone) => segments.extend(["zones", zone.as_str()]),
        }
        segments.extend(["operations", name]);
        segments
    }
}

/// Adapter for global, regional and zonal compute operations.
#[derive(Debug, Clone)]
pub struct ComputeOperationHandle<C> {
    api: ApiClient<C>,
    project: String,
    scope: ComputeScope,
    snapshot: Snapshot<ComputeOperation>,
}

impl<C> ComputeOperationHandle<C>
where
    C: HttpClient,
{
    /// Fails with a configuration error when the project, or the region or
    /// zone of a scoped operation, is empty.
    pub fn new(
        api: ApiClient<C>,
        project: impl Into<String>,
        scope: ComputeScope,
        snapshot: Snapshot<ComputeOperation>,
    ) -> Result<Self> {
        let project = project.into();
        require("project", &project)?;
        scope.validate()?;
        require("operation name", &snapshot.op().name)?;
        Ok(Self {
            api,
            project,
            scope,
            snapshot,
        })
    }

    pub fn global(
        api: ApiClient<C>,
        project: impl Into<String>,
        snapshot: Snapshot<ComputeOperation>,
    ) -> Result<Self> {
        Self::new(api, project, ComputeScope::Global, snapshot)
    }

    pub fn regional(
        api: ApiClient<C>,
        project: impl Into<String>,
        region: impl Into<String>,
        snapshot: Snapshot<ComputeOperation>,
    ) -> Result<Self> {
        Self::new(api, project, ComputeScope::Region(region.into()), snapshot)
    }

    pub fn zonal(
        api: ApiClient<C>,
        project: impl Into<String>,
        zone: impl Into<String>,
        snapshot: Snapshot<ComputeOperation>,
    ) -> Result<Self> {
        Self::new(api, project, ComputeScope::Zone(zone.into()), snapshot)
    }

    /// Scope taken from the operation's own zone or region link.
    pub fn derived(
        api: ApiClient<C>,
        project: impl Into<String>,
        snapshot: Snapshot<ComputeOperation>,
    ) -> Result<Self> {
        let scope = ComputeScope::of(snapshot.op());
        Self::new(api, project, scope, snapshot)
    }

    pub fn scope(&self) -> &ComputeScope {
        &self.scope
    }

    pub fn operation(&self) -> &ComputeOperation {
        self.snapshot.op()
    }
}

impl<C> OperationHandle for ComputeOperationHandle<C>
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
            let segments = self.scope.segments(&self.project, self.name());
            let url = self.api.service_url(Service::Compute, &segments)?;
            let (op, raw) = self.api.get_json(&url).await?;
            Ok(Self {
                api: self.api.clone(),
                project: self.project.clone(),
                scope: self.scope.clone(),
                snapshot: Snapshot::new(op, raw),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::{
        config::ClientConfig,
        error::{Error, ErrorKind},
        remote::mem::{Reply, ScriptedClient},
    };

    fn api(http: &ScriptedClient) -> ApiClient<ScriptedClient> {
        let config = ClientConfig::builder()
            .endpoint(Service::Compute, "http://compute.test/v1/")
            .build()
            .unwrap();
        ApiClient::new(http.clone(), config)
    }

    fn snapshot(value: serde_json::Value) -> Snapshot<ComputeOperation> {
        Snapshot::decode(serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn scope_prefers_zone_then_region() {
        let zonal = snapshot(json!({
            "name": "op-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "region": "https://www.googleapis.com/compute/v1/projects/p/regions/us-central1"
        }));
        assert_eq!(
            ComputeScope::of(zonal.op()),
            ComputeScope::Zone("us-central1-a".into())
        );
        let regional = snapshot(json!({"name": "op-2", "region": "projects/p/regions/us-east1"}));
        assert_eq!(
            ComputeScope::of(regional.op()),
            ComputeScope::Region("us-east1".into())
        );
        let global = snapshot(json!({"name": "op-3", "zone": ""}));
        assert_eq!(ComputeScope::of(global.op()), ComputeScope::Global);
    }

    #[test]
    fn scoped_construction_requires_scope() {
        let http = ScriptedClient::new();
        let op = snapshot(json!({"name": "op-1", "status": "RUNNING"}));
        let err = ComputeOperationHandle::zonal(api(&http), "p", "", op.clone()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = ComputeOperationHandle::regional(api(&http), "p", " ", op.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = ComputeOperationHandle::global(api(&http), "", op).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn refresh_hits_the_scoped_endpoint() {
        let http = ScriptedClient::new();
        http.push(Reply::json(&json!({"name": "op-1", "status": "RUNNING"})))
            .push(Reply::json(&json!({"name": "op-1", "status": "DONE"})))
            .push(Reply::json(&json!({"name": "op-1", "status": "DONE"})));
        let op = snapshot(json!({"name": "op-1", "status": "PENDING"}));

        block_on(async {
            let zonal = ComputeOperationHandle::zonal(api(&http), "p", "us-central1-a", op.clone())
                .unwrap();
            let next = zonal.refresh().await.unwrap();
            assert_eq!(next.status(), OperationStatus::Running);
            assert_eq!(next.scope(), zonal.scope());

            let regional =
                ComputeOperationHandle::regional(api(&http), "p", "us-east1", op.clone()).unwrap();
            let done = regional.refresh().await.unwrap();
            assert!(done.is_terminal());
            assert!(done.result_error().is_none());

            ComputeOperationHandle::global(api(&http), "p", op)
                .unwrap()
                .refresh()
                .await
                .unwrap();
        });

        let uris: Vec<_> = http.requests().into_iter().map(|r| r.uri).collect();
        assert_eq!(
            uris,
            vec![
                "http://compute.test/v1/projects/p/zones/us-central1-a/operations/op-1",
                "http://compute.test/v1/projects/p/regions/us-east1/operations/op-1",
                "http://compute.test/v1/projects/p/global/operations/op-1",
            ]
        );
    }

    #[test]
    fn running_operation_never_reports_an_error() {
        let http = ScriptedClient::new();
        let op = snapshot(json!({
            "name": "op-1",
            "status": "RUNNING",
            "error": {"errors": [{"code": "X", "message": "premature"}]}
        }));
        let handle = ComputeOperationHandle::global(api(&http), "p", op).unwrap();
        assert!(!handle.is_terminal());
        assert!(handle.result_error().is_none());
    }
}
