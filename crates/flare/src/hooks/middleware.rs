use super::changes::{detect_changes, fetch_after, fetch_before, snapshot_ids};
use super::registry::{AfterHook, HookRegistry};
use crate::engine::{Action, Args, CallOptions, Output, Request, SharedEngine};
use crate::error::OrmResult;
use crate::middleware::{Middleware, Next};
use crate::value::Record;
use futures_util::future::{BoxFuture, join_all};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Middleware running the hooks of a [`HookRegistry`] around every model call.
///
/// Per call:
///
/// 1. raw requests (no model) pass through untouched
/// 2. the per-call [`CallOptions`] are taken out of the request
/// 3. before hooks run in registration order; the first error aborts the call
/// 4. update-shaped calls with column hooks fetch a "before" snapshot of the
///    watched columns, gated by `enable_column_hooks` and `max_refetch`
/// 5. the call runs; its result is returned unchanged
/// 6. in a background task: changed columns are detected against a re-fetch
///    by id and column hooks run, then after hooks run; failures are logged
pub struct HookMiddleware {
    registry: Arc<HookRegistry>,
    engine: SharedEngine,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl HookMiddleware {
    /// Hooks receive `engine`, normally the client's base engine.
    pub fn new(registry: Arc<HookRegistry>, engine: SharedEngine) -> Self {
        Self {
            registry,
            engine,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Whether column hooks run for a call on `model` affecting `records` records.
    pub fn should_run_column_hooks(&self, model: &str, options: CallOptions, records: usize) -> bool {
        self.column_hooks_wanted(model, options) && self.within_refetch_limit(model, records)
    }

    fn column_hooks_wanted(&self, model: &str, options: CallOptions) -> bool {
        !options.skip_column_hooks
            && self.registry.config().enable_column_hooks
            && self.registry.has_column_hooks(model)
    }

    fn within_refetch_limit(&self, model: &str, records: usize) -> bool {
        let config = self.registry.config();
        if records <= config.max_refetch {
            return true;
        }
        if config.warn_on_skip {
            tracing::warn!(
                target: "flare.hooks",
                model,
                records,
                max_refetch = config.max_refetch,
                "too many records for column hooks, skipping change detection"
            );
        }
        false
    }

    /// The "before" snapshot, or `None` when column hooks don't run for this call.
    async fn prepare_column_check(
        &self,
        model: &str,
        request: &Request,
        options: CallOptions,
    ) -> Option<Vec<Record>> {
        if !request.action.is_update_shaped() || !self.column_hooks_wanted(model, options) {
            return None;
        }
        let fields = self.registry.relevant_fields(model);
        let where_clause = request.args.query.where_clause.clone();
        match fetch_before(self.engine.as_ref(), model, where_clause, fields).await {
            Ok(snapshot) => self
                .within_refetch_limit(model, snapshot.len())
                .then_some(snapshot),
            Err(error) => {
                tracing::warn!(
                    target: "flare.hooks",
                    model,
                    %error,
                    "failed to fetch records before update, skipping column hooks"
                );
                None
            }
        }
    }

    async fn run_in_background(&self, task: impl Future<Output = ()> + Send + 'static) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(task);
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.retain(|handle| !handle.is_finished());
                pending.push(handle);
            }
            // Not on a tokio runtime: nowhere to spawn, run inline.
            Err(_) => task.await,
        }
    }

    /// Wait until every background hook task has finished.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for result in join_all(handles).await {
                if let Err(error) = result {
                    tracing::error!(target: "flare.hooks", %error, "hook task panicked");
                }
            }
        }
    }
}

impl Middleware for HookMiddleware {
    fn handle<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, OrmResult<Output>> {
        Box::pin(async move {
            let Some(model) = request.model.clone() else {
                return next.run(request).await;
            };
            let options = std::mem::take(&mut request.options);
            let action = request.action;

            for hook in self.registry.before_hooks(&model, action) {
                let args = std::mem::take(&mut request.args);
                request.args = hook(args, self.engine.clone()).await?;
            }

            let snapshot = self.prepare_column_check(&model, &request, options).await;
            let args = request.args.clone();

            let output = next.run(request).await?;

            let after_hooks = self.registry.after_hooks(&model, action);
            let snapshot = snapshot.filter(|records| !records.is_empty());
            if snapshot.is_some() || !after_hooks.is_empty() {
                let task = AfterPhase {
                    registry: self.registry.clone(),
                    engine: self.engine.clone(),
                    model,
                    action,
                    args,
                    output: output.clone(),
                    snapshot,
                    after_hooks,
                };
                self.run_in_background(task.run()).await;
            }

            Ok(output)
        })
    }
}

impl fmt::Debug for HookMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookMiddleware")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Everything the background part of a call needs, owned.
struct AfterPhase {
    registry: Arc<HookRegistry>,
    engine: SharedEngine,
    model: String,
    action: Action,
    args: Args,
    output: Output,
    snapshot: Option<Vec<Record>>,
    after_hooks: Vec<AfterHook>,
}

impl AfterPhase {
    async fn run(self) {
        if let Some(before) = &self.snapshot {
            if let Err(error) = self.run_column_hooks(before).await {
                tracing::error!(
                    target: "flare.hooks",
                    model = %self.model,
                    %error,
                    "column change detection failed"
                );
            }
        }

        let calls = self
            .after_hooks
            .iter()
            .map(|hook| hook(self.args.clone(), self.output.clone(), self.engine.clone()));
        for result in join_all(calls).await {
            if let Err(error) = result {
                tracing::error!(
                    target: "flare.hooks",
                    model = %self.model,
                    action = %self.action,
                    %error,
                    "after hook failed"
                );
            }
        }
    }

    async fn run_column_hooks(&self, before: &[Record]) -> OrmResult<()> {
        let ids = snapshot_ids(before);
        if ids.is_empty() {
            return Ok(());
        }
        let after = fetch_after(self.engine.as_ref(), &self.model, ids).await?;
        let columns = self.registry.watched_columns(&self.model);

        let mut calls = Vec::new();
        for change in detect_changes(&self.model, before, &after, &columns) {
            for hook in self.registry.column_hooks(&self.model, &change.column) {
                calls.push(hook(change.clone(), self.engine.clone()));
            }
        }
        for result in join_all(calls).await {
            if let Err(error) = result {
                tracing::error!(
                    target: "flare.hooks",
                    model = %self.model,
                    %error,
                    "column hook failed"
                );
            }
        }
        Ok(())
    }
}
