//! The generic query builder.

use super::compose::Query;
use super::state::QueryState;
use crate::client::Client;
use crate::engine::CallOptions;
use crate::registry::ModelRegistry;
use std::fmt;
use std::sync::Arc;

/// Generic, unspecialized builder.
///
/// Holds the accumulated [`QueryState`] plus the context terminals need: the
/// model name, the [`Client`] to execute against, the [`ModelRegistry`] used
/// when including relations, and per-call [`CallOptions`].
///
/// Model-specific builders wrap a `QueryBuilder` and implement [`Query`] to
/// inherit the whole composer and terminal surface:
///
/// ```ignore
/// struct UserQuery(QueryBuilder);
///
/// impl Query for UserQuery {
///     fn builder(&self) -> &QueryBuilder { &self.0 }
///     fn builder_mut(&mut self) -> &mut QueryBuilder { &mut self.0 }
///     fn from_builder(builder: QueryBuilder) -> Self { Self(builder) }
/// }
///
/// impl UserQuery {
///     fn active(self) -> Self { self.where_(Condition::eq("status", "active")) }
/// }
/// ```
#[derive(Clone, Default)]
pub struct QueryBuilder {
    pub(crate) model: Option<String>,
    pub(crate) state: QueryState,
    pub(crate) options: CallOptions,
    pub(crate) client: Option<Client>,
    pub(crate) models: Option<Arc<ModelRegistry>>,
}

impl QueryBuilder {
    /// Create a builder for a model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Create a builder scoped to no particular model.
    pub fn generic() -> Self {
        Self::default()
    }

    /// Attach the client terminals execute against.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Attach the registry used by `include_with`.
    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn options(&self) -> CallOptions {
        self.options
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn models(&self) -> Option<&Arc<ModelRegistry>> {
        self.models.as_ref()
    }

    /// Same model, client and registry; empty state and default options.
    pub fn fresh(&self) -> Self {
        Self {
            model: self.model.clone(),
            state: QueryState::default(),
            options: CallOptions::default(),
            client: self.client.clone(),
            models: self.models.clone(),
        }
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("model", &self.model)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

impl Query for QueryBuilder {
    fn builder(&self) -> &QueryBuilder {
        self
    }

    fn builder_mut(&mut self) -> &mut QueryBuilder {
        self
    }

    fn from_builder(builder: QueryBuilder) -> Self {
        builder
    }
}
