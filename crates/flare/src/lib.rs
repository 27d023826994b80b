//! # flare
//!
//! A runtime layer over a database-access engine: fluent query composition
//! plus hooks around every model operation.
//!
//! ## Features
//!
//! - **Condition composition**: `where_` / `or_where` / groups never drop a
//!   predicate; `or_where` wraps the whole accumulated tree
//! - **Model builders**: newtypes over [`QueryBuilder`] inherit the composer and
//!   every terminal through the [`Query`] and [`Execute`] traits
//! - **Relations**: `include_with` hands a nested builder, resolved through the
//!   [`ModelRegistry`], to a closure
//! - **Hooks**: before/after hooks per `(model, action)` and column hooks that
//!   fire when an update changed a watched column
//! - **Middleware**: every call, from a builder or a [`Delegate`], runs through
//!   one chain in front of the [`Engine`]
//!
//! ## Quick start
//!
//! ```ignore
//! use flare::prelude::*;
//!
//! let hooks = Arc::new(HookRegistry::new());
//! hooks.after_change("order", "status", |change: ColumnChange, _engine: SharedEngine| {
//!     Box::pin(async move {
//!         tracing::info!(id = %change.record["id"], from = %change.old, to = %change.new, "order moved");
//!         Ok(())
//!     })
//! });
//!
//! let client = Client::new(MemoryEngine::new().with_model("order")).with_hooks(hooks);
//!
//! // WHERE (status = 'pending' AND total >= 100) OR priority = true
//! let orders = client
//!     .model("order")
//!     .where_(Condition::eq("status", "pending"))
//!     .where_(Condition::gte("total", 100))
//!     .or_where(Condition::eq("priority", true))
//!     .order_desc("created_at")
//!     .find_many()
//!     .await?;
//!
//! client
//!     .model("order")
//!     .where_(Condition::eq("status", "pending"))
//!     .update_many(record! { "status" => "shipped" })
//!     .await?;
//! ```

pub mod client;
pub mod condition;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod middleware;
pub mod monitor;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod value;

pub use client::Client;
pub use condition::{Combinator, Condition, Op};
pub use engine::{
    Action, Aggregate, AggregateFn, Args, CallOptions, Data, Delegate, Engine, Output, Request,
    SharedEngine,
};
pub use error::{OrmError, OrmResult};
pub use hooks::{ColumnChange, HookConfig, HookMiddleware, HookRegistry};
pub use memory::MemoryEngine;
pub use middleware::{Middleware, Next, middleware_fn};
pub use monitor::{RequestStats, StatsMiddleware, TracingMiddleware};
pub use query::{
    Direction, Execute, Include, OrderBy, Page, PageMeta, Query, QueryBuilder, QueryState,
    RelationQuery,
};
pub use registry::{BuilderRegistration, DynQuery, ModelRegistry};
pub use value::{Record, Value};

// Re-export inventory for use by `register_query!`
pub use inventory;
