use super::config::HookConfig;
use crate::engine::{Action, Args, Output, SharedEngine};
use crate::error::OrmResult;
use crate::query::ID_FIELD;
use crate::value::{Record, Value};
use futures_util::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Runs before an operation; returns the (possibly modified) arguments.
/// An error aborts the operation.
pub type BeforeHook =
    Arc<dyn Fn(Args, SharedEngine) -> BoxFuture<'static, OrmResult<Args>> + Send + Sync>;

/// Runs after an operation with its arguments and result.
pub type AfterHook =
    Arc<dyn Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>> + Send + Sync>;

/// Runs when a watched column changed on one record.
pub type ColumnHook =
    Arc<dyn Fn(ColumnChange, SharedEngine) -> BoxFuture<'static, OrmResult<()>> + Send + Sync>;

/// One detected column change.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub model: String,
    pub column: String,
    pub old: Value,
    pub new: Value,
    /// The record as re-fetched after the update.
    pub record: Record,
}

#[derive(Default)]
struct Hooks {
    before: HashMap<(String, Action), Vec<BeforeHook>>,
    after: HashMap<(String, Action), Vec<AfterHook>>,
    columns: HashMap<(String, String), Vec<ColumnHook>>,
    watched: HashMap<String, BTreeSet<String>>,
}

/// Registered hooks and their configuration.
///
/// Model names are case-insensitive. Hooks for the same key run in
/// registration order (before hooks) or concurrently (after and column hooks).
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Hooks>,
    config: RwLock<HookConfig>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HookConfig) -> Self {
        Self {
            hooks: RwLock::default(),
            config: RwLock::new(config),
        }
    }

    // ==================== Registration ====================

    /// Register a before hook for `(model, action)`.
    pub fn before<F>(&self, model: &str, action: Action, hook: F)
    where
        F: Fn(Args, SharedEngine) -> BoxFuture<'static, OrmResult<Args>> + Send + Sync + 'static,
    {
        self.write()
            .before
            .entry((key(model), action))
            .or_default()
            .push(Arc::new(hook));
    }

    /// Register an after hook for `(model, action)`.
    pub fn after<F>(&self, model: &str, action: Action, hook: F)
    where
        F: Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.write()
            .after
            .entry((key(model), action))
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn before_create<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, SharedEngine) -> BoxFuture<'static, OrmResult<Args>> + Send + Sync + 'static,
    {
        self.before(model, Action::Create, hook);
    }

    pub fn after_create<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.after(model, Action::Create, hook);
    }

    pub fn before_update<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, SharedEngine) -> BoxFuture<'static, OrmResult<Args>> + Send + Sync + 'static,
    {
        self.before(model, Action::Update, hook);
    }

    pub fn after_update<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.after(model, Action::Update, hook);
    }

    pub fn before_delete<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, SharedEngine) -> BoxFuture<'static, OrmResult<Args>> + Send + Sync + 'static,
    {
        self.before(model, Action::Delete, hook);
    }

    pub fn after_delete<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.after(model, Action::Delete, hook);
    }

    pub fn after_upsert<F>(&self, model: &str, hook: F)
    where
        F: Fn(Args, Output, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.after(model, Action::Upsert, hook);
    }

    /// Register a column hook: runs once per updated record whose `column` changed.
    pub fn after_change<F>(&self, model: &str, column: &str, hook: F)
    where
        F: Fn(ColumnChange, SharedEngine) -> BoxFuture<'static, OrmResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let model = key(model);
        let mut hooks = self.write();
        hooks
            .watched
            .entry(model.clone())
            .or_default()
            .insert(column.to_string());
        hooks
            .columns
            .entry((model, column.to_string()))
            .or_default()
            .push(Arc::new(hook));
    }

    // ==================== Lookup ====================

    pub fn before_hooks(&self, model: &str, action: Action) -> Vec<BeforeHook> {
        self.read()
            .before
            .get(&(key(model), action))
            .cloned()
            .unwrap_or_default()
    }

    pub fn after_hooks(&self, model: &str, action: Action) -> Vec<AfterHook> {
        self.read()
            .after
            .get(&(key(model), action))
            .cloned()
            .unwrap_or_default()
    }

    pub fn column_hooks(&self, model: &str, column: &str) -> Vec<ColumnHook> {
        self.read()
            .columns
            .get(&(key(model), column.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Columns with at least one column hook.
    pub fn watched_columns(&self, model: &str) -> BTreeSet<String> {
        self.read()
            .watched
            .get(&key(model))
            .cloned()
            .unwrap_or_default()
    }

    /// Watched columns plus `id`: what the "before" snapshot selects.
    pub fn relevant_fields(&self, model: &str) -> Vec<String> {
        let mut fields = self.watched_columns(model);
        fields.insert(ID_FIELD.to_string());
        fields.into_iter().collect()
    }

    pub fn has_column_hooks(&self, model: &str) -> bool {
        self.read()
            .watched
            .get(&key(model))
            .is_some_and(|columns| !columns.is_empty())
    }

    /// Total number of registered hooks.
    pub fn hook_count(&self) -> usize {
        let hooks = self.read();
        let before: usize = hooks.before.values().map(Vec::len).sum();
        let after: usize = hooks.after.values().map(Vec::len).sum();
        let columns: usize = hooks.columns.values().map(Vec::len).sum();
        before + after + columns
    }

    // ==================== Configuration ====================

    pub fn config(&self) -> HookConfig {
        *self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the configuration.
    pub fn configure(&self, config: HookConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Patch the configuration in place.
    pub fn update_config(&self, patch: impl FnOnce(&mut HookConfig)) {
        patch(&mut self.config.write().unwrap_or_else(|e| e.into_inner()));
    }

    /// Remove every hook and reset the configuration.
    pub fn clear_all(&self) {
        *self.write() = Hooks::default();
        self.configure(HookConfig::default());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Hooks> {
        self.hooks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hook_count())
            .field("config", &self.config())
            .finish()
    }
}

fn key(model: &str) -> String {
    model.to_lowercase()
}
