//! The interception point around every engine call.
//!
//! A [`Middleware`] receives the [`Request`] and a [`Next`] handle to the rest
//! of the chain. It can inspect or rewrite the request, short-circuit with its
//! own result, or await `next.run(request)` and post-process the output.
//!
//! ```ignore
//! let client = Client::new(engine).with_middleware(middleware_fn(|request, next| {
//!     Box::pin(async move {
//!         tracing::debug!(action = %request.action, "intercepted");
//!         next.run(request).await
//!     })
//! }));
//! ```

use crate::engine::{Engine, Output, Request};
use crate::error::OrmResult;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A link of the middleware chain.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, OrmResult<Output>>;
}

/// The remainder of the chain: further middleware, then the engine.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    engine: &'a dyn Engine,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(engine: &'a dyn Engine, rest: &'a [Arc<dyn Middleware>]) -> Self {
        Self { engine, rest }
    }

    /// Pass the request to the next link.
    pub fn run(self, request: Request) -> BoxFuture<'a, OrmResult<Output>> {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(request, Next::new(self.engine, rest)),
            None => self.engine.execute(request),
        }
    }
}

/// Middleware backed by a closure; see [`middleware_fn`].
pub struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, OrmResult<Output>> + Send + Sync,
{
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, OrmResult<Output>> {
        (self.0)(request, next)
    }
}

/// Adapt a closure into a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, OrmResult<Output>> + Send + Sync,
{
    FnMiddleware(f)
}
