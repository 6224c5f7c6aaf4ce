//! Per-request context threaded through the middleware pipeline.

use crate::Request;
use crate::background::BackgroundTasks;

/// The request being handled plus the execution context it runs in.
///
/// Middleware may rewrite the request in place (the cache layer buffers
/// its body) before passing the context on with [`Next::run`](crate::middleware::Next::run).
#[derive(Debug)]
pub struct Context {
    request: Request,
    tasks: BackgroundTasks,
}

impl Context {
    /// Creates a context for `request` whose background work is tracked by `tasks`.
    pub fn new(request: Request, tasks: BackgroundTasks) -> Self {
        Self { request, tasks }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The registry that keeps this invocation alive for detached work.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}
