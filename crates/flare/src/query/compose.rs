//! Condition composition and query shaping.
//!
//! Every builder (the generic [`QueryBuilder`], model-specific wrappers and
//! [`RelationQuery`]) gets these methods from the [`Query`] trait.
//!
//! Composition rules:
//! - `where_` / `and_where`: `And[existing, new]`
//! - `or_where`: `Or[existing, new]` (wraps the *whole* accumulated tree, so
//!   `where_(a).where_(b).or_where(c)` is `Or[And[a, b], c]`)
//! - `where_group` / `or_where_group`: build the group on a fresh builder of the
//!   same type, then fold it in; an empty group changes nothing

use super::builder::QueryBuilder;
use super::relation::RelationQuery;
use super::state::{Direction, Include, OrderBy, QueryState};
use super::ID_FIELD;
use crate::condition::{Combinator, Condition};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Builder surface shared by all query builders.
pub trait Query: Sized + Send + Sync {
    /// The wrapped generic builder.
    fn builder(&self) -> &QueryBuilder;

    /// Mutable access to the wrapped generic builder.
    fn builder_mut(&mut self) -> &mut QueryBuilder;

    /// Wrap a generic builder.
    fn from_builder(builder: QueryBuilder) -> Self;

    /// A new, independent builder of the same type and scope with an empty state.
    fn fresh(&self) -> Self {
        Self::from_builder(self.builder().fresh())
    }

    /// The accumulated state.
    fn get_query(&self) -> &QueryState {
        &self.builder().state
    }

    /// Take the accumulated state out of the builder.
    fn into_query(mut self) -> QueryState {
        std::mem::take(&mut self.builder_mut().state)
    }

    // ==================== WHERE composition ====================

    /// AND a predicate onto the accumulated condition.
    fn where_(mut self, predicate: impl Into<Condition>) -> Self {
        compose(&mut self.builder_mut().state, predicate.into(), Combinator::And);
        self
    }

    /// Alias of [`Query::where_`].
    fn and_where(self, predicate: impl Into<Condition>) -> Self {
        self.where_(predicate)
    }

    /// OR a predicate with the whole accumulated condition.
    fn or_where(mut self, predicate: impl Into<Condition>) -> Self {
        compose(&mut self.builder_mut().state, predicate.into(), Combinator::Or);
        self
    }

    /// AND a group built on a fresh builder.
    fn where_group<F>(self, group: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.where_group_with(group, Combinator::And)
    }

    /// OR a group built on a fresh builder.
    fn or_where_group<F>(self, group: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        self.where_group_with(group, Combinator::Or)
    }

    /// Fold a group built on a fresh builder with the given combinator.
    fn where_group_with<F>(mut self, group: F, combinator: Combinator) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let grouped = group(self.fresh()).into_query().where_clause;
        if let Some(condition) = grouped {
            compose(&mut self.builder_mut().state, condition, combinator);
        }
        self
    }

    /// Filter by identity. Falsy ids (`0`, `""`, null, false) are rejected.
    fn with_id(self, id: impl Into<Value>) -> OrmResult<Self> {
        let id = id.into();
        if id.is_falsy() {
            return Err(OrmError::invalid_argument("id is required"));
        }
        Ok(self.where_(Condition::eq(ID_FIELD, id)))
    }

    // ==================== Shaping ====================

    /// Append an ORDER BY entry.
    fn order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.builder_mut().state.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    fn order_asc(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Asc)
    }

    fn order_desc(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Desc)
    }

    /// Earliest record by `field`: ascending order, take 1.
    fn first(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Asc).limit(1)
    }

    /// Latest record by `field`: descending order, take 1.
    fn last(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Desc).limit(1)
    }

    fn limit(mut self, take: u64) -> Self {
        self.builder_mut().state.take = Some(take);
        self
    }

    fn skip(mut self, skip: u64) -> Self {
        self.builder_mut().state.skip = Some(skip);
        self
    }

    fn distinct<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builder_mut().state.distinct = fields.into_iter().map(Into::into).collect();
        self
    }

    fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builder_mut().state.select = fields.into_iter().map(Into::into).collect();
        self
    }

    fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builder_mut().state.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// AND a condition onto the HAVING tree.
    fn having(mut self, condition: impl Into<Condition>) -> Self {
        let state = &mut self.builder_mut().state;
        let next = condition.into();
        if !next.is_empty() {
            state.having = Some(Condition::fold(state.having.take(), next, Combinator::And));
        }
        self
    }

    // ==================== Relations ====================

    /// Include a relation with default options.
    fn include(mut self, relation: impl Into<String>) -> Self {
        self.builder_mut()
            .state
            .include
            .insert(relation.into(), Include::All);
        self
    }

    /// Include a relation shaped by a nested builder.
    ///
    /// The nested builder comes from the [`ModelRegistry`](crate::ModelRegistry)
    /// when the relation is registered (so its custom methods are reachable
    /// through [`RelationQuery::with`]), otherwise it is a generic builder.
    /// An empty nested state is stored as [`Include::All`].
    fn include_with<F>(mut self, relation: impl Into<String>, shape: F) -> Self
    where
        F: FnOnce(RelationQuery) -> RelationQuery,
    {
        let relation = relation.into();
        let nested = RelationQuery::resolve(self.builder().models.clone(), &relation);
        let state = shape(nested).into_query();
        let include = if state.is_empty() {
            Include::All
        } else {
            Include::Query(Box::new(state))
        };
        self.builder_mut().state.include.insert(relation, include);
        self
    }

    // ==================== Control ====================

    /// Apply `apply` only when `condition` holds.
    fn when<F>(self, condition: bool, apply: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition { apply(self) } else { self }
    }

    /// Skip column-change hooks for calls made by this builder.
    fn skip_column_hooks(mut self) -> Self {
        self.builder_mut().options.skip_column_hooks = true;
        self
    }
}

fn compose(state: &mut QueryState, next: Condition, combinator: Combinator) {
    if next.is_empty() {
        return;
    }
    let existing = state.where_clause.take();
    state.where_clause = Some(Condition::fold(existing, next, combinator));
}
