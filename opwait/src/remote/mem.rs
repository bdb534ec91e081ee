//! In-memory [`HttpClient`] that replays scripted replies.
//!
//! Useful for characterization tests against recorded API payloads: queue the
//! replies a real endpoint produced, run the code under test, then inspect the
//! requests it issued.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use opwait_core::{BoxedError, ManualTimer};

use super::http::{HttpClient, HttpError};

/// A canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this status and body.
    Body { status: StatusCode, body: Bytes },
    /// Fail at the network layer with an I/O error of this kind.
    Network(std::io::ErrorKind),
}

impl Reply {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Reply::Body {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Reply::ok(value.to_string())
    }

    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        Reply::Body {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
        }
    }

    /// A Google style error envelope.
    pub fn google_error(status: u16, message: &str, reason: &str) -> Self {
        let body = serde_json::json!({
            "error": {
                "code": status,
                "message": message,
                "errors": [{ "message": message, "domain": "global", "reason": reason }],
            }
        });
        Reply::status(status, body.to_string())
    }
}

/// A request as seen by [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    fallback: Option<Reply>,
    requests: Vec<RecordedRequest>,
    latency: Option<(ManualTimer, Duration)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one reply.
    pub fn push(&self, reply: Reply) -> &Self {
        self.script().replies.push_back(reply);
        self
    }

    /// Reply used once the queue is drained.
    pub fn otherwise(&self, reply: Reply) -> &Self {
        self.script().fallback = Some(reply);
        self
    }

    /// Advance `timer` by `per_call` on every request, modelling a slow remote.
    pub fn with_latency(self, timer: ManualTimer, per_call: Duration) -> Self {
        self.script().latency = Some((timer, per_call));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script().requests.len()
    }

    pub fn pending_replies(&self) -> usize {
        self.script().replies.len()
    }
}

impl HttpClient for ScriptedClient {
    type RespBody = Full<Bytes>;

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
        let body = body
            .map_frame(|frame| frame.map_data(Into::into))
            .collect()
            .await
            .map_err(|e| HttpError::Other(e.into()))?
            .to_bytes();

        let reply = {
            let mut script = self.script();
            script.requests.push(RecordedRequest {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body,
            });
            if let Some((timer, per_call)) = &script.latency {
                timer.advance(*per_call);
            }
            script
                .replies
                .pop_front()
                .or_else(|| script.fallback.clone())
        };

        match reply {
            Some(Reply::Body { status, body }) => Ok(Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Full::new(body))?),
            Some(Reply::Network(kind)) => Err(HttpError::Io(std::io::Error::new(
                kind,
                "scripted network failure",
            ))),
            None => Err(HttpError::Other("scripted client has no reply left".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;
    use http_body_util::Empty;

    use super::*;

    #[test]
    fn replays_in_order_then_falls_back() {
        let client = ScriptedClient::new();
        client
            .push(Reply::ok("first"))
            .push(Reply::status(503, "busy"))
            .otherwise(Reply::ok("again"));

        block_on(async {
            let mut statuses = Vec::new();
            for _ in 0..4 {
                let req = Request::get("https://example.test/op")
                    .body(Empty::<Bytes>::new())
                    .unwrap();
                statuses.push(client.send_request(req).await.unwrap().status().as_u16());
            }
            assert_eq!(statuses, vec![200, 503, 200, 200]);
        });
        assert_eq!(client.request_count(), 4);
    }

    #[test]
    fn network_reply_is_an_io_error() {
        let client = ScriptedClient::new();
        client.push(Reply::Network(std::io::ErrorKind::ConnectionReset));
        let req = Request::get("https://example.test/op")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let err = block_on(client.send_request(req)).unwrap_err();
        assert!(matches!(err, HttpError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn empty_script_fails() {
        let client = ScriptedClient::new();
        let req = Request::get("https://example.test/op")
            .body(Empty::<Bytes>::new())
            .unwrap();
        assert!(block_on(client.send_request(req)).is_err());
    }
}
