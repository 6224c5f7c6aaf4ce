//! The upstream the cache sits in front of.
//!
//! Routing and transport to the origin host belong to the hosting platform;
//! this crate only needs the capability to turn a [`Request`] into a
//! [`Response`]. Any `Fn(Request) -> impl Future<Output = Result<Response, OriginError>>`
//! is an [`Origin`].

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::http::{Request, Response, StatusCode};

/// Errors surfaced by an [`Origin`].
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin {host} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("origin did not answer in time")]
    Timeout,

    #[error("origin failed: {0}")]
    Upstream(String),
}

impl OriginError {
    /// The status a caller should see for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Unreachable { .. } | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Renders the failure as a response for callers that expect one.
    pub fn into_response(self) -> Response {
        Response::new(self.status())
            .header("Cache-Control", "no-store")
            .body(self.to_string())
    }
}

/// Boxed future returned by [`Origin::fetch`].
pub type OriginFuture<'a> = Pin<Box<dyn Future<Output = Result<Response, OriginError>> + Send + 'a>>;

/// A fetch capability for the upstream server.
///
/// # Examples
///
/// ```rust,no_run
/// use postcache::http::{Request, Response, StatusCode};
/// use postcache::origin::{Origin, OriginError};
///
/// let origin = |_req: Request| async {
///     Ok::<_, OriginError>(Response::new(StatusCode::OK).body("from origin"))
/// };
/// # fn assert_origin<O: Origin>(_: &O) {}
/// # assert_origin(&origin);
/// ```
pub trait Origin: Send + Sync {
    /// Forwards `request` upstream and resolves to its response.
    fn fetch(&self, request: Request) -> OriginFuture<'_>;
}

impl<T, F> Origin for T
where
    T: Fn(Request) -> F + Send + Sync,
    F: Future<Output = Result<Response, OriginError>> + Send + 'static,
{
    fn fetch(&self, request: Request) -> OriginFuture<'_> {
        Box::pin((self)(request))
    }
}
