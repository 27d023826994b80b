//! Condition trees for dynamic queries.
//!
//! A [`Condition`] is either a leaf (`Fields`: field name to [`Op`]) or a
//! combinator (`And` / `Or` over a list, `Not` over one node). Builders never
//! overwrite an existing condition; they fold new predicates into a combinator
//! with [`Condition::fold`].
//!
//! # Example
//! ```ignore
//! use flare::{Condition, Op};
//!
//! let active_adults = Condition::eq("status", "active").with("age", Op::gte(18));
//! let either = Condition::or(vec![active_adults, Condition::eq("role", "admin")]);
//! ```

use crate::value::{Record, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// field = value
    Eq(Value),
    /// field != value
    Ne(Value),
    /// field > value
    Gt(Value),
    /// field >= value
    Gte(Value),
    /// field < value
    Lt(Value),
    /// field <= value
    Lte(Value),
    /// field IN (list)
    In(Vec<Value>),
    /// field NOT IN (list)
    NotIn(Vec<Value>),
    /// substring match
    Contains(String),
    /// prefix match
    StartsWith(String),
    /// suffix match
    EndsWith(String),
    /// field IS NULL
    IsNull,
    /// field IS NOT NULL
    IsNotNull,
    /// from <= field <= to
    Between(Value, Value),
}

impl Op {
    pub fn eq(value: impl Into<Value>) -> Self {
        Op::Eq(value.into())
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Op::Ne(value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Op::Gt(value.into())
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Op::Gte(value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Op::Lt(value.into())
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Op::Lte(value.into())
    }

    pub fn in_list<T: Into<Value>>(values: Vec<T>) -> Self {
        Op::In(values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<T: Into<Value>>(values: Vec<T>) -> Self {
        Op::NotIn(values.into_iter().map(Into::into).collect())
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        Op::Contains(needle.into())
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Op::StartsWith(prefix.into())
    }

    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Op::EndsWith(suffix.into())
    }

    pub fn is_null() -> Self {
        Op::IsNull
    }

    pub fn is_not_null() -> Self {
        Op::IsNotNull
    }

    pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Op::Between(from.into(), to.into())
    }

    /// Evaluate the predicate against a field value (missing fields are `Null`).
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Op::Eq(expected) => value.same(expected),
            Op::Ne(expected) => !value.same(expected),
            Op::Gt(bound) => value.compare(bound) == Some(Ordering::Greater),
            Op::Gte(bound) => matches!(
                value.compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::Lt(bound) => value.compare(bound) == Some(Ordering::Less),
            Op::Lte(bound) => {
                matches!(value.compare(bound), Some(Ordering::Less | Ordering::Equal))
            }
            Op::In(list) => list.iter().any(|item| value.same(item)),
            Op::NotIn(list) => !list.iter().any(|item| value.same(item)),
            Op::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
            Op::StartsWith(prefix) => value.as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
            Op::EndsWith(suffix) => value.as_str().is_some_and(|s| s.ends_with(suffix.as_str())),
            Op::IsNull => value.is_null(),
            Op::IsNotNull => !value.is_null(),
            Op::Between(from, to) => {
                Op::Gte(from.clone()).matches(value) && Op::Lte(to.clone()).matches(value)
            }
        }
    }
}

/// How a new predicate joins the accumulated tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    /// Build `existing <op> next` as a two-element combinator node.
    pub fn join(self, existing: Condition, next: Condition) -> Condition {
        match self {
            Combinator::And => Condition::And(vec![existing, next]),
            Combinator::Or => Condition::Or(vec![existing, next]),
        }
    }
}

/// A node of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Leaf: every listed field must satisfy its predicate.
    Fields(BTreeMap<String, Op>),
    /// All children must match.
    And(Vec<Condition>),
    /// At least one child must match.
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Leaf with a single field predicate.
    pub fn field(name: impl Into<String>, op: Op) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.into(), op);
        Condition::Fields(fields)
    }

    /// Add another field predicate to a leaf.
    ///
    /// On a combinator node the predicate is ANDed onto the node instead.
    pub fn with(self, name: impl Into<String>, op: Op) -> Self {
        match self {
            Condition::Fields(mut fields) => {
                fields.insert(name.into(), op);
                Condition::Fields(fields)
            }
            other => Condition::And(vec![other, Condition::field(name, op)]),
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::eq(value))
    }

    pub fn ne(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::ne(value))
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::gt(value))
    }

    pub fn gte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::gte(value))
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::lt(value))
    }

    pub fn lte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Op::lte(value))
    }

    pub fn in_list<T: Into<Value>>(name: impl Into<String>, values: Vec<T>) -> Self {
        Self::field(name, Op::in_list(values))
    }

    pub fn not_in<T: Into<Value>>(name: impl Into<String>, values: Vec<T>) -> Self {
        Self::field(name, Op::not_in(values))
    }

    pub fn contains(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::field(name, Op::contains(needle))
    }

    pub fn is_null(name: impl Into<String>) -> Self {
        Self::field(name, Op::IsNull)
    }

    pub fn is_not_null(name: impl Into<String>) -> Self {
        Self::field(name, Op::IsNotNull)
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Check if this condition constrains nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Fields(fields) => fields.is_empty(),
            Condition::And(items) | Condition::Or(items) => items.iter().all(Condition::is_empty),
            Condition::Not(inner) => inner.is_empty(),
        }
    }

    /// Fold `next` into an optional accumulated tree.
    ///
    /// With nothing accumulated, `next` becomes the tree. Otherwise the whole
    /// accumulated tree and `next` become the two children of a new
    /// `combinator` node, so repeated calls build a left-leaning tree.
    pub fn fold(existing: Option<Condition>, next: Condition, combinator: Combinator) -> Condition {
        match existing {
            None => next,
            Some(existing) => combinator.join(existing, next),
        }
    }

    /// Evaluate this condition against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Fields(fields) => fields
                .iter()
                .all(|(name, op)| op.matches(record.get(name).unwrap_or(&Value::Null))),
            Condition::And(items) => items.iter().all(|c| c.matches(record)),
            Condition::Or(items) => items.iter().any(|c| c.matches(record)),
            Condition::Not(inner) => !inner.matches(record),
        }
    }
}

/// A record used as a condition means equality on every field.
impl From<Record> for Condition {
    fn from(record: Record) -> Self {
        Condition::Fields(
            record
                .into_iter()
                .map(|(name, value)| (name, Op::Eq(value)))
                .collect(),
        )
    }
}

/// JSON objects convert like records; anything else is an empty leaf.
impl From<serde_json::Value> for Condition {
    fn from(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Object(record) => Condition::from(record),
            _ => Condition::Fields(BTreeMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn leaf_matches_every_field() {
        let c = Condition::eq("status", "active").with("age", Op::gte(18));
        assert!(c.matches(&record! { "status" => "active", "age" => 30 }));
        assert!(!c.matches(&record! { "status" => "active", "age" => 12 }));
        assert!(!c.matches(&record! { "status" => "banned", "age" => 30 }));
    }

    #[test]
    fn combinators_evaluate() {
        let c = Condition::or(vec![
            Condition::eq("role", "admin"),
            Condition::not(Condition::is_null("email")),
        ]);
        assert!(c.matches(&record! { "role" => "admin" }));
        assert!(c.matches(&record! { "role" => "user", "email" => "a@b.c" }));
        assert!(!c.matches(&record! { "role" => "user" }));
    }

    #[test]
    fn fold_wraps_the_whole_tree() {
        let a = Condition::eq("a", 1);
        let b = Condition::eq("b", 2);
        let c = Condition::eq("c", 3);
        let ab = Condition::fold(Some(a.clone()), b.clone(), Combinator::And);
        let tree = Condition::fold(Some(ab), c.clone(), Combinator::Or);
        assert_eq!(
            tree,
            Condition::Or(vec![Condition::And(vec![a, b]), c])
        );
    }

    #[test]
    fn empty_detection() {
        assert!(Condition::from(record! {}).is_empty());
        assert!(Condition::and(vec![]).is_empty());
        assert!(!Condition::eq("a", 1).is_empty());
    }

    #[test]
    fn string_and_list_ops() {
        let r = record! { "name" => "alice", "tier" => 2 };
        assert!(Condition::contains("name", "lic").matches(&r));
        assert!(Condition::field("name", Op::starts_with("al")).matches(&r));
        assert!(Condition::in_list("tier", vec![1, 2]).matches(&r));
        assert!(!Condition::not_in("tier", vec![1, 2]).matches(&r));
        assert!(Condition::field("tier", Op::between(1, 3)).matches(&r));
    }
}
