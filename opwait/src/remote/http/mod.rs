mod error;
#[cfg(feature = "tokio-http")]
pub mod tokio;

use std::{future::Future, sync::Arc};

use bytes::Bytes;
pub use error::HttpError;
use http::{Request, Response};
use http_body::Body;
use opwait_core::{BoxedError, MaybeSend, MaybeSync};

/// The single seam between the engine and the network.
///
/// Authentication is the implementor's business: a client is expected to
/// attach credentials to every request it sends.
pub trait HttpClient: MaybeSend + MaybeSync {
    type RespBody: Body<Data: Into<Bytes>, Error: Into<BoxedError>> + Send + 'static;

    fn send_request<B>(
        &self,
        request: Request<B>,
    ) -> impl Future<Output = Result<Response<Self::RespBody>, HttpError>> + MaybeSend
    where
        B: Body + Send + Sync + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<BoxedError>;
}

impl<C> HttpClient for Arc<C>
where
    C: HttpClient,
{
    type RespBody = C::RespBody;

    fn send_request<B>(
        &self,
        request: Request<B>,
    ) -> impl Future<Output = Result<Response<Self::RespBody>, HttpError>> + MaybeSend
    where
        B: Body + Send + Sync + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<BoxedError>,
    {
        (**self).send_request(request)
    }
}
