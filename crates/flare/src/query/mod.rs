//! Fluent query composition.
//!
//! - [`Query`]: condition composition (`where_`, `or_where`, groups, `with_id`)
//!   and query shaping, shared by every builder
//! - [`Execute`]: async terminals forwarding to the [`Client`](crate::Client)
//! - [`QueryBuilder`]: the generic builder; model-specific builders wrap it
//! - [`RelationQuery`]: the nested builder handed to `include_with`

mod builder;
mod compose;
mod execute;
mod relation;
mod state;

pub use builder::QueryBuilder;
pub use compose::Query;
pub use execute::{Execute, Page, PageMeta};
pub use relation::RelationQuery;
pub use state::{Direction, Include, OrderBy, QueryState};

/// Identity field used by `with_id`, chunking and change detection.
pub const ID_FIELD: &str = "id";

#[cfg(test)]
mod tests;
