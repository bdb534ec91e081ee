use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use opwait_core::BoxedError;

use super::{HttpClient, HttpError};

/// [`HttpClient`] backed by `reqwest`. Wrap a pre-configured
/// `reqwest::Client` (default auth headers, proxies, timeouts) with
/// [`TokioClient::with_client`].
#[derive(Debug, Clone)]
pub struct TokioClient {
    client: reqwest::Client,
}

impl Default for TokioClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for TokioClient {
    type RespBody = reqwest::Body;

    async fn send_request<B>(
        &self,
        request: Request<B>,
    ) -> Result<Response<Self::RespBody>, HttpError>
    where
        B: Body + Send + Sync + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<BoxedError>,
    {
        let (parts, body) = request.into_parts();
        let request = Request::from_parts(parts, reqwest::Body::wrap(body));
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;
        Ok(response.into())
    }
}
