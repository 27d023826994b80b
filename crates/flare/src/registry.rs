//! Model name to builder factory registry.
//!
//! Used when including relations: `include_with("posts", ..)` asks the
//! registry for the `posts` builder so custom builder methods stay reachable
//! inside the nested closure.
//!
//! Builders can be registered at runtime with [`ModelRegistry::register`] or
//! at link time with [`register_query!`](crate::register_query), collected by
//! [`ModelRegistry::from_inventory`].

use crate::error::{OrmError, OrmResult};
use crate::query::{Query, QueryBuilder};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Object-safe view over any [`Query`] builder.
pub trait DynQuery: Any + Send + Sync {
    fn dyn_builder(&self) -> &QueryBuilder;
    fn dyn_builder_mut(&mut self) -> &mut QueryBuilder;
    fn fresh_dyn(&self) -> Box<dyn DynQuery>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Query + 'static> DynQuery for T {
    fn dyn_builder(&self) -> &QueryBuilder {
        self.builder()
    }

    fn dyn_builder_mut(&mut self) -> &mut QueryBuilder {
        self.builder_mut()
    }

    fn fresh_dyn(&self) -> Box<dyn DynQuery> {
        Box::new(self.fresh())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Factory producing a fresh builder.
pub type BuilderFactory = Arc<dyn Fn() -> Box<dyn DynQuery> + Send + Sync>;

/// Link-time builder registration, submitted with [`register_query!`](crate::register_query).
pub struct BuilderRegistration {
    pub name: &'static str,
    pub factory: fn() -> Box<dyn DynQuery>,
}

inventory::collect!(BuilderRegistration);

/// Register a builder type under a model name at link time.
///
/// ```ignore
/// flare::register_query!(PostQuery, "post");
/// let models = ModelRegistry::from_inventory();
/// ```
#[macro_export]
macro_rules! register_query {
    ($ty:ty, $name:expr) => {
        $crate::inventory::submit! {
            $crate::registry::BuilderRegistration {
                name: $name,
                factory: || {
                    ::std::boxed::Box::new(<$ty as $crate::Query>::from_builder(
                        $crate::QueryBuilder::new($name),
                    )) as ::std::boxed::Box<dyn $crate::registry::DynQuery>
                },
            }
        }
    };
}

/// Model name to builder factory map. Names are case-insensitive.
#[derive(Default)]
pub struct ModelRegistry {
    factories: RwLock<HashMap<String, BuilderFactory>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every builder submitted with `register_query!`.
    pub fn from_inventory() -> Self {
        let registry = Self::new();
        for registration in inventory::iter::<BuilderRegistration> {
            let factory = registration.factory;
            registry.insert(registration.name, Arc::new(factory));
        }
        registry
    }

    /// Register builder type `Q` for `model`.
    pub fn register<Q: Query + 'static>(&self, model: &str) -> OrmResult<()> {
        let name = model.to_string();
        self.register_factory(
            model,
            Arc::new(move || {
                Box::new(Q::from_builder(QueryBuilder::new(name.clone()))) as Box<dyn DynQuery>
            }),
        )
    }

    /// Register a custom factory for `model`, replacing any previous one.
    pub fn register_factory(&self, model: &str, factory: BuilderFactory) -> OrmResult<()> {
        if model.trim().is_empty() {
            return Err(OrmError::invalid_argument("model name is required"));
        }
        self.insert(model, factory);
        Ok(())
    }

    fn insert(&self, model: &str, factory: BuilderFactory) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.to_lowercase(), factory);
    }

    /// Build a fresh builder for `model`, if registered.
    pub fn create(&self, model: &str) -> Option<Box<dyn DynQuery>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&model.to_lowercase())
            .cloned()?;
        Some(factory())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&model.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<&String> = factories.keys().collect();
        names.sort();
        f.debug_struct("ModelRegistry").field("models", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    struct PostQuery(QueryBuilder);

    impl Query for PostQuery {
        fn builder(&self) -> &QueryBuilder {
            &self.0
        }

        fn builder_mut(&mut self) -> &mut QueryBuilder {
            &mut self.0
        }

        fn from_builder(builder: QueryBuilder) -> Self {
            Self(builder)
        }
    }

    impl PostQuery {
        fn published(self) -> Self {
            self.where_(Condition::eq("published", true))
        }
    }

    crate::register_query!(PostQuery, "linked_post");

    #[test]
    fn registered_builders_are_created_by_name() {
        let registry = ModelRegistry::new();
        registry.register::<PostQuery>("Post").unwrap();
        assert!(registry.contains("post"));
        let built = registry.create("POST").unwrap();
        assert!(built.as_any().is::<PostQuery>());
        assert_eq!(built.dyn_builder().model(), Some("Post"));
        assert!(registry.create("comment").is_none());
    }

    #[test]
    fn empty_names_are_rejected() {
        let registry = ModelRegistry::new();
        assert!(registry.register::<PostQuery>(" ").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn inventory_registrations_are_collected() {
        let registry = ModelRegistry::from_inventory();
        let built = registry.create("linked_post").unwrap();
        assert!(built.as_any().is::<PostQuery>());
    }

    #[test]
    fn fresh_dyn_keeps_the_builder_type() {
        let built: Box<dyn DynQuery> = Box::new(PostQuery::from_builder(QueryBuilder::new("post")).published());
        let fresh = built.fresh_dyn();
        assert!(fresh.as_any().is::<PostQuery>());
        assert!(fresh.dyn_builder().state().is_empty());
    }
}
