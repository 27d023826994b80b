//! The structured query descriptor accumulated by builders.

use crate::condition::Condition;
use std::collections::BTreeMap;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// How a relation is included.
#[derive(Debug, Clone, PartialEq)]
pub enum Include {
    /// Include the relation with default options.
    All,
    /// Include the relation shaped by a nested query.
    Query(Box<QueryState>),
}

/// Everything a builder has accumulated.
///
/// `Clone` is a deep copy: conditions, values and nested includes are owned,
/// so a cloned state never shares anything with its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// WHERE tree.
    pub where_clause: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    /// Projected fields; empty means all fields.
    pub select: Vec<String>,
    pub include: BTreeMap<String, Include>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Option<Condition>,
}

impl QueryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.where_clause.as_ref().is_none_or(Condition::is_empty)
            && self.order_by.is_empty()
            && self.select.is_empty()
            && self.include.is_empty()
            && self.skip.is_none()
            && self.take.is_none()
            && self.distinct.is_empty()
            && self.group_by.is_empty()
            && self.having.as_ref().is_none_or(Condition::is_empty)
    }

    /// A state holding only a WHERE tree.
    pub fn filtered(where_clause: Option<Condition>) -> Self {
        Self {
            where_clause,
            ..Self::default()
        }
    }
}
