use opwait_core::BoxedError;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Http(#[from] http::Error),
    #[cfg(feature = "tokio-http")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] BoxedError),
}
