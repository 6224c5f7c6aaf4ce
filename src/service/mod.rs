//! Host-facing entry point.
//!
//! The hosting platform owns the listener, TLS, and the event loop. It hands
//! each invocation to a [`Service`], either as a [`Request`] or as raw
//! HTTP/1.1 bytes, and awaits [`Service::shutdown`] (or drains its own
//! [`BackgroundTasks`]) before tearing the execution context down so that
//! background cache writes complete.

use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::background::BackgroundTasks;
use crate::context::Context;
use crate::http::{Request, RequestError, Response, StatusCode};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::origin::Origin;

/// Maximum size of a raw request accepted by [`Service::dispatch`] (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Builder for [`Service`]. Layers run in the order they are added.
pub struct ServiceBuilder {
    middlewares: Vec<MiddlewareHandler>,
    origin: Arc<dyn Origin>,
}

impl ServiceBuilder {
    /// Appends a layer; the first one added sees the request first.
    #[must_use]
    pub fn layer<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
        self
    }

    pub fn build(self) -> Service {
        Service {
            middlewares: Arc::from(self.middlewares),
            origin: self.origin,
            tasks: BackgroundTasks::new(),
        }
    }
}

/// A middleware pipeline in front of an origin.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use postcache::cache::{CacheConfig, MemoryStore, PostCacheMiddleware};
/// use postcache::http::{Request, Response, StatusCode};
/// use postcache::origin::OriginError;
/// use postcache::service::Service;
///
/// let service = Service::builder(|_req: Request| async {
///     Ok::<_, OriginError>(Response::new(StatusCode::OK).body("Fetched from origin"))
/// })
/// .layer(PostCacheMiddleware::new(MemoryStore::new(), &CacheConfig::default()))
/// .build();
///
/// let raw = b"POST /path HTTP/1.1\r\nHost: example.com\r\nContent-Length: 2\r\n\r\n{}";
/// let wire = service.dispatch(raw, "https").await;
/// assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
///
/// service.shutdown().await;
/// # }
/// ```
pub struct Service {
    middlewares: Arc<[MiddlewareHandler]>,
    origin: Arc<dyn Origin>,
    tasks: BackgroundTasks,
}

impl Service {
    /// Starts a pipeline that ends at `origin`.
    pub fn builder<O>(origin: O) -> ServiceBuilder
    where
        O: Origin + 'static,
    {
        ServiceBuilder {
            middlewares: Vec::new(),
            origin: Arc::new(origin),
        }
    }

    /// The registry background work is attached to by [`handle`](Self::handle).
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Runs `request` through the pipeline, attaching background work to
    /// the service-wide registry.
    pub async fn handle(&self, request: Request) -> Response {
        self.handle_with(request, &self.tasks).await
    }

    /// Runs `request` through the pipeline, attaching background work to
    /// `tasks`. Use this when the host scopes lifetimes per invocation.
    pub async fn handle_with(&self, request: Request, tasks: &BackgroundTasks) -> Response {
        debug!(method = %request.method(), url = %request.url(), "dispatching request");
        let ctx = Context::new(request, tasks.clone());
        Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.origin))
            .run(ctx)
            .await
    }

    /// Parses one complete HTTP/1.1 request from `raw`, handles it, and
    /// returns the serialized response.
    ///
    /// Oversized input yields `413`; malformed or truncated input yields `400`.
    pub async fn dispatch(&self, raw: &[u8], scheme: &str) -> BytesMut {
        if raw.len() > MAX_REQUEST_SIZE {
            warn!(len = raw.len(), "request too large — sending 413");
            return Response::new(StatusCode::PAYLOAD_TOO_LARGE)
                .body("Request entity too large")
                .keep_alive(false)
                .into_bytes();
        }

        let request = match Request::parse(raw, scheme) {
            Ok((request, _)) => request,
            Err(e) => {
                warn!(error = %e, "bad request — sending 400");
                return bad_request(&e).into_bytes();
            }
        };

        let keep_alive = request.is_keep_alive();
        self.handle(request).await.keep_alive(keep_alive).into_bytes()
    }

    /// Waits for all background work attached to the service-wide registry.
    pub async fn shutdown(&self) {
        self.tasks.drain().await;
    }
}

fn bad_request(err: &RequestError) -> Response {
    Response::new(StatusCode::BAD_REQUEST)
        .body(format!("Bad Request: {err}"))
        .keep_alive(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::OriginError;

    fn echo_service() -> Service {
        Service::builder(|req: Request| async move {
            let body = req.body().as_bytes().cloned().unwrap_or_default();
            Ok::<_, OriginError>(Response::new(StatusCode::OK).raw_body(body))
        })
        .build()
    }

    fn wire_text(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn dispatch_round_trip() {
        let raw = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let text = wire_text(echo_service().dispatch(raw, "http").await);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn malformed_request_is_400() {
        let text = wire_text(echo_service().dispatch(b"\x00\x01garbage\r\n\r\n", "http").await);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn truncated_request_is_400() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nabc";
        let text = wire_text(echo_service().dispatch(raw, "http").await);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn unparsable_content_length_is_400() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: abc\r\n\r\nhello";
        let text = wire_text(echo_service().dispatch(raw, "http").await);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn chunked_request_reaches_origin_decoded() {
        let raw = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                    3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n";
        let text = wire_text(echo_service().dispatch(raw, "http").await);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn connection_close_is_honored() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let text = wire_text(echo_service().dispatch(raw, "http").await);
        assert!(text.contains("Connection: close\r\n"));
    }
}
