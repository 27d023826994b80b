//! Hooks around model operations.
//!
//! Register callbacks on a [`HookRegistry`] and install it with
//! [`Client::with_hooks`](crate::Client::with_hooks):
//!
//! - before hooks (`before_create`, `before_update`, ...) run in order before
//!   the operation and may rewrite its [`Args`](crate::Args) or abort it
//! - after hooks (`after_create`, `after_update`, ...) run in the background
//!   once the operation succeeded
//! - column hooks (`after_change`) run in the background for every updated
//!   record whose watched column changed value
//!
//! # Example
//!
//! ```ignore
//! use flare::prelude::*;
//!
//! let hooks = Arc::new(HookRegistry::new());
//! hooks.before_create("user", |mut args: Args, _engine: SharedEngine| {
//!     Box::pin(async move {
//!         if let Some(data) = args.data_one_mut() {
//!             data.entry("status".into()).or_insert(Value::from("pending"));
//!         }
//!         Ok(args)
//!     })
//! });
//! hooks.update_config(|config| config.max_refetch = 500);
//! ```

mod changes;
mod config;
mod middleware;
mod registry;

pub use changes::detect_changes;
pub use config::HookConfig;
pub use middleware::HookMiddleware;
pub use registry::{AfterHook, BeforeHook, ColumnChange, ColumnHook, HookRegistry};
