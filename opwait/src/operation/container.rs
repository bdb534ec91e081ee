use std::future::Future;

use bytes::Bytes;
use opwait_core::MaybeSend;
use serde::Deserialize;

use super::{last_segment, require, terminal_errors, OperationHandle, OperationStatus, Snapshot};
use crate::{
    classify::ErrorPayload,
    config::Service,
    error::{Error, OperationErrors, Result, TransportError},
    remote::{http::HttpClient, ApiClient},
};

/// Kubernetes Engine operation resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOperation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    /// Zone or region the operation runs in.
    pub location: Option<String>,
    /// Deprecated location field still populated for zonal clusters.
    pub zone: Option<String>,
    pub operation_type: Option<String>,
    pub status_message: Option<String>,
    pub self_link: Option<String>,
    pub target_link: Option<String>,
    pub error: Option<ErrorPayload>,
}

/// Adapter for container operations, scoped by location.
#[derive(Debug, Clone)]
pub struct ContainerOperationHandle<C> {
    api: ApiClient<C>,
    project: String,
    location: String,
    snapshot: Snapshot<ContainerOperation>,
}

impl<C> ContainerOperationHandle<C>
where
    C: HttpClient,
{
    pub fn new(
        api: ApiClient<C>,
        project: impl Into<String>,
        location: impl Into<String>,
        snapshot: Snapshot<ContainerOperation>,
    ) -> Result<Self> {
        let project = project.into();
        let location = location.into();
        require("project", &project)?;
        require("location", &location)?;
        require("operation name", &snapshot.op().name)?;
        Ok(Self {
            api,
            project,
            location,
            snapshot,
        })
    }

    /// Location taken from the operation's `location`, falling back to `zone`.
    pub fn derived(
        api: ApiClient<C>,
        project: impl Into<String>,
        snapshot: Snapshot<ContainerOperation>,
    ) -> Result<Self> {
        let op = snapshot.op();
        let location = [&op.location, &op.zone]
            .into_iter()
            .flatten()
            .map(|l| last_segment(l))
            .find(|l| !l.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::configuration(format!("container operation {} has no location", op.name))
            })?;
        Self::new(api, project, location, snapshot)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn operation(&self) -> &ContainerOperation {
        self.snapshot.op()
    }
}

impl<C> OperationHandle for ContainerOperationHandle<C>
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
                Service::Container,
                &[
                    "projects",
                    &self.project,
                    "locations",
                    &self.location,
                    "operations",
                    self.name(),
                ],
            )?;
            let (op, raw) = self.api.get_json(&url).await?;
            Ok(Self {
                api: self.api.clone(),
                project: self.project.clone(),
                location: self.location.clone(),
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
        remote::mem::{Reply, ScriptedClient},
    };

    fn api(http: &ScriptedClient) -> ApiClient<ScriptedClient> {
        let config = ClientConfig::builder()
            .endpoint(Service::Container, "http://container.test/v1/")
            .build()
            .unwrap();
        ApiClient::new(http.clone(), config)
    }

    #[test]
    fn location_falls_back_to_zone() {
        let http = ScriptedClient::new();
        let snapshot = Snapshot::decode(r#"{"name": "op-gke", "zone": "us-central1-b"}"#).unwrap();
        let handle = ContainerOperationHandle::derived(api(&http), "p", snapshot).unwrap();
        assert_eq!(handle.location(), "us-central1-b");

        let snapshot = Snapshot::decode(r#"{"name": "op-gke"}"#).unwrap();
        let err = ContainerOperationHandle::derived(api(&http), "p", snapshot).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rpc_status_error_surfaces_when_done() {
        let http = ScriptedClient::new();
        http.push(Reply::json(&json!({
            "name": "op-gke",
            "status": "DONE",
            "location": "europe-west1",
            "error": {"code": 9, "message": "node pool is being upgraded"}
        })));
        let snapshot =
            Snapshot::decode(r#"{"name": "op-gke", "status": "RUNNING", "location": "europe-west1"}"#)
                .unwrap();
        let handle = ContainerOperationHandle::derived(api(&http), "p", snapshot).unwrap();
        let done = block_on(handle.refresh()).unwrap();
        assert_eq!(
            done.result_error().unwrap().to_string(),
            "node pool is being upgraded\n"
        );
        assert_eq!(
            http.requests()[0].uri,
            "http://container.test/v1/projects/p/locations/europe-west1/operations/op-gke"
        );
    }
}
