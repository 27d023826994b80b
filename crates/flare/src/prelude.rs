//! Convenient imports for typical `flare` usage.
//!
//! ```ignore
//! use flare::prelude::*;
//! ```

pub use crate::{
    Action, Args, CallOptions, Client, ColumnChange, Condition, Delegate, Direction, Engine,
    Execute, HookConfig, HookRegistry, MemoryEngine, ModelRegistry, Op, OrmError, OrmResult,
    Output, Query, QueryBuilder, Record, SharedEngine, Value, record,
};
