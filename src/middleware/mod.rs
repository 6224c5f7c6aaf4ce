//! Middleware pipeline — composable layers in front of the origin.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to
//!   advance. Once the chain is exhausted the request goes to the origin.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] into a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{Response, context::Context, origin::Origin};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward
/// at most once. When no middleware is left, `run` forwards the request to
/// the origin; an origin failure becomes a `502`/`504` response.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use postcache::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
    origin: Arc<dyn Origin>,
}

/// A type-erased, reference-counted middleware function.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use postcache::{context::Context, middleware::{MiddlewareHandler, Next}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a cursor at the start of `middlewares`, ending at `origin`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, origin: Arc<dyn Origin>) -> Self {
        Self {
            middlewares,
            index: 0,
            origin,
        }
    }

    /// Invokes the next middleware, or the origin once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        if let Some(handler) = self.middlewares.get(self.index).cloned() {
            self.index += 1;
            return handler(ctx, self).await;
        }

        let request = ctx.into_request();
        match self.origin.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "origin fetch failed");
                err.into_response()
            }
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass
/// through, short-circuit with their own [`Response`] (a cache hit does
/// this), or decorate the downstream response.
///
/// Implementations must be `Send + Sync` and return a `Send` future because
/// the pipeline is shared across Tokio tasks.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs each request's method, URL, status, and duration once it completes.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let url = ctx.request().url().clone();

            let response = next.run(ctx).await;

            info!(
                method = %method,
                url = %url,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundTasks;
    use crate::http::{Request, StatusCode};
    use crate::origin::OriginError;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Layer", tag);
                response
            })
        }
    }

    fn ctx() -> Context {
        Context::new(
            Request::get("https://example.com/").unwrap(),
            BackgroundTasks::new(),
        )
    }

    fn ok_origin() -> Arc<dyn Origin> {
        Arc::new(|_req: Request| async { Ok::<_, OriginError>(Response::new(StatusCode::OK)) })
    }

    #[tokio::test]
    async fn empty_chain_reaches_origin() {
        let next = Next::new(Arc::from(Vec::new()), ok_origin());
        assert_eq!(next.run(ctx()).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn layers_run_outermost_first() {
        let chain: Vec<MiddlewareHandler> = vec![
            from_middleware(Arc::new(Tag("outer"))),
            from_middleware(Arc::new(Tag("inner"))),
        ];
        let response = Next::new(Arc::from(chain), ok_origin()).run(ctx()).await;
        let layers: Vec<_> = response.headers().get_all("x-layer").collect();
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn origin_failure_becomes_bad_gateway() {
        let origin: Arc<dyn Origin> = Arc::new(|_req: Request| async {
            Err::<Response, _>(OriginError::Upstream("connection reset".into()))
        });
        let response = Next::new(Arc::from(Vec::new()), origin).run(ctx()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
