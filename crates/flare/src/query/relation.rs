//! Nested builders for `include_with`.

use super::builder::QueryBuilder;
use super::compose::Query;
use crate::registry::{DynQuery, ModelRegistry};
use std::sync::Arc;

/// Builder handed to an `include_with` closure.
///
/// Wraps whichever builder the [`ModelRegistry`] produced for the relation.
/// The generic composer methods work directly; model-specific methods are
/// reached through [`RelationQuery::with`]:
///
/// ```ignore
/// let q = client
///     .model("user")
///     .include_with("posts", |posts| posts.with(|p: PostQuery| p.published()).limit(5));
/// ```
pub struct RelationQuery {
    inner: Box<dyn DynQuery>,
}

impl RelationQuery {
    /// Resolve the builder for `relation`, falling back to a generic builder
    /// scoped to no model.
    pub(crate) fn resolve(models: Option<Arc<ModelRegistry>>, relation: &str) -> Self {
        let mut inner = models
            .as_ref()
            .and_then(|registry| registry.create(relation))
            .unwrap_or_else(|| Box::new(QueryBuilder::generic()));
        if let Some(models) = models {
            inner.dyn_builder_mut().models = Some(models);
        }
        Self { inner }
    }

    /// Check whether the wrapped builder is a `Q`.
    pub fn is<Q: Query + 'static>(&self) -> bool {
        self.inner.as_any().is::<Q>()
    }

    /// Run `f` on the wrapped builder as a `Q`.
    ///
    /// When the registry produced a different builder type, the accumulated
    /// state is carried over into `Q::from_builder`.
    pub fn with<Q, F>(self, f: F) -> Self
    where
        Q: Query + 'static,
        F: FnOnce(Q) -> Q,
    {
        let fallback = self.inner.dyn_builder().clone();
        let typed = match self.inner.into_any().downcast::<Q>() {
            Ok(typed) => *typed,
            Err(_) => Q::from_builder(fallback),
        };
        Self {
            inner: Box::new(f(typed)),
        }
    }
}

impl std::fmt::Debug for RelationQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RelationQuery")
            .field(self.inner.dyn_builder())
            .finish()
    }
}

impl Query for RelationQuery {
    fn builder(&self) -> &QueryBuilder {
        self.inner.dyn_builder()
    }

    fn builder_mut(&mut self) -> &mut QueryBuilder {
        self.inner.dyn_builder_mut()
    }

    fn from_builder(builder: QueryBuilder) -> Self {
        Self {
            inner: Box::new(builder),
        }
    }

    fn fresh(&self) -> Self {
        Self {
            inner: self.inner.fresh_dyn(),
        }
    }
}
