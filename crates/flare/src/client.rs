//! The client: base engine, middleware chain and registries.

use crate::engine::{Delegate, Engine, Output, Request, SharedEngine};
use crate::error::OrmResult;
use crate::hooks::{HookMiddleware, HookRegistry};
use crate::middleware::{Middleware, Next};
use crate::query::{Query, QueryBuilder};
use crate::registry::ModelRegistry;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Entry point for queries and direct engine calls.
///
/// Every call, whether it comes from a builder terminal, a [`Delegate`] or
/// [`Engine::execute`], runs through the middleware chain before reaching the
/// base engine. Middleware runs in the order it was added (first added is
/// outermost).
///
/// # Example
///
/// ```ignore
/// use flare::prelude::*;
///
/// let hooks = Arc::new(HookRegistry::new());
/// hooks.after_change("user", "status", |change: ColumnChange, _engine: SharedEngine| {
///     Box::pin(async move {
///         tracing::info!(old = %change.old, new = %change.new, "status changed");
///         Ok(())
///     })
/// });
///
/// let client = Client::new(MemoryEngine::new().with_model("user")).with_hooks(hooks);
/// let active = client.model("user").where_(Condition::eq("status", "active")).find_many().await?;
/// ```
#[derive(Clone)]
pub struct Client {
    engine: SharedEngine,
    middleware: Vec<Arc<dyn Middleware>>,
    hooks: Option<Arc<HookMiddleware>>,
    models: Arc<ModelRegistry>,
}

impl Client {
    /// Wrap a base engine. Builders registered with `register_query!` are
    /// available for relation includes.
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    pub fn from_shared(engine: SharedEngine) -> Self {
        Self {
            engine,
            middleware: Vec::new(),
            hooks: None,
            models: Arc::new(ModelRegistry::from_inventory()),
        }
    }

    /// Append a middleware to the chain.
    pub fn with_middleware(self, middleware: impl Middleware + 'static) -> Self {
        self.with_middleware_arc(Arc::new(middleware))
    }

    pub fn with_middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Install hook execution for `registry`.
    ///
    /// Hooks receive the base engine, so calls made from inside a hook are not
    /// intercepted again.
    pub fn with_hooks(mut self, registry: Arc<HookRegistry>) -> Self {
        let hooks = Arc::new(HookMiddleware::new(registry, self.engine.clone()));
        self.hooks = Some(hooks.clone());
        self.with_middleware_arc(hooks)
    }

    /// Replace the registry used for relation includes.
    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = models;
        self
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    /// The base engine, bypassing the middleware chain.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Generic builder for `model`.
    pub fn model(&self, model: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(model)
            .with_client(self.clone())
            .with_models(self.models.clone())
    }

    /// Model-specific builder for `model`.
    pub fn query<Q: Query>(&self, model: impl Into<String>) -> Q {
        Q::from_builder(self.model(model))
    }

    /// Delegate for `model` running through the middleware chain.
    pub fn delegate<'a>(&'a self, model: &'a str) -> Delegate<'a> {
        Delegate::new(self, model)
    }

    /// Wait for background hook work (after hooks, column hooks) to finish.
    pub async fn settle(&self) {
        if let Some(hooks) = &self.hooks {
            hooks.settle().await;
        }
    }
}

impl Engine for Client {
    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, OrmResult<Output>> {
        Next::new(self.engine.as_ref(), &self.middleware).run(request)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("middleware", &self.middleware.len())
            .field("hooks", &self.hooks.is_some())
            .field("models", &self.models)
            .finish()
    }
}
