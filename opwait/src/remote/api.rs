use std::{fmt, sync::Arc};

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request};
use http_body_util::{BodyExt, Full};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::http::{HttpClient, HttpError};
use crate::{
    config::{ClientConfig, Service},
    error::TransportError,
};

const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// JSON REST client shared by every operation adapter: one [`HttpClient`]
/// plus the client configuration, cheap to clone.
pub struct ApiClient<C> {
    http: Arc<C>,
    config: Arc<ClientConfig>,
}

impl<C> Clone for ApiClient<C> {
    fn clone(&self) -> Self {
        Self {
            http: Arc::clone(&self.http),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C> fmt::Debug for ApiClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C> ApiClient<C>
where
    C: HttpClient,
{
    pub fn new(http: C, config: ClientConfig) -> Self {
        Self {
            http: Arc::new(http),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    /// `segments` appended to the service's base URL, each percent-encoded.
    pub fn service_url(&self, service: Service, segments: &[&str]) -> Result<Url, TransportError> {
        join_segments(self.config.endpoint(service), segments)
    }

    pub async fn get_json<T>(&self, url: &Url) -> Result<(T, Bytes), TransportError>
    where
        T: DeserializeOwned,
    {
        let raw = self.execute(Method::GET, url, None).await?;
        let value = serde_json::from_slice(&raw)?;
        Ok((value, raw))
    }

    /// Issue a mutating call with a JSON body and decode the JSON reply.
    pub async fn send_json<T, Q>(
        &self,
        method: Method,
        url: &Url,
        body: &Q,
    ) -> Result<(T, Bytes), TransportError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let payload = Bytes::from(serde_json::to_vec(body)?);
        let raw = self.execute(method, url, Some(payload)).await?;
        let value = serde_json::from_slice(&raw)?;
        Ok((value, raw))
    }

    async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
    ) -> Result<Bytes, TransportError> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(header::USER_AGENT, self.config.user_agent())
            .header(header::ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(project) = self.config.billing_project() {
            let value = HeaderValue::from_str(project).map_err(|e| HttpError::Other(Box::new(e)))?;
            builder = builder.header(USER_PROJECT_HEADER, value);
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(HttpError::from)?;

        tracing::trace!(method = %method, url = %url, "sending request");
        let response = self.http.send_request(request).await?;
        let status = response.status();
        let raw = response
            .into_body()
            .map_frame(|frame| frame.map_data(Into::into))
            .collect()
            .await
            .map_err(|e| HttpError::Other(e.into()))?
            .to_bytes();

        if !status.is_success() {
            return Err(TransportError::from_reply(
                status,
                String::from_utf8_lossy(&raw).into_owned(),
            ));
        }
        Ok(raw)
    }
}

pub(crate) fn join_segments(base: &str, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = Url::parse(base).map_err(HttpError::from)?;
    url.path_segments_mut()
        .map_err(|()| HttpError::Other(format!("{base} cannot be a base URL").into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
