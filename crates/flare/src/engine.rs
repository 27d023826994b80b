//! The narrow interface to the underlying database engine.
//!
//! Everything flare sends down is a [`Request`]: an optional model name, an
//! [`Action`], one [`Args`] options object and per-call [`CallOptions`]. An
//! [`Engine`] answers with an [`Output`]. [`Delegate`] is the per-model view
//! with one async method per action.

use crate::error::{OrmError, OrmResult};
use crate::query::QueryState;
use crate::value::{Record, Value};
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    FindMany,
    FindFirst,
    FindFirstOrThrow,
    FindUnique,
    FindUniqueOrThrow,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    Upsert,
    Count,
    Aggregate,
    GroupBy,
    /// Raw statements; never carries a model.
    Raw,
}

impl Action {
    /// Name as used by model delegates (`findMany`, `updateMany`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::FindMany => "findMany",
            Action::FindFirst => "findFirst",
            Action::FindFirstOrThrow => "findFirstOrThrow",
            Action::FindUnique => "findUnique",
            Action::FindUniqueOrThrow => "findUniqueOrThrow",
            Action::Create => "create",
            Action::CreateMany => "createMany",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Delete => "delete",
            Action::DeleteMany => "deleteMany",
            Action::Upsert => "upsert",
            Action::Count => "count",
            Action::Aggregate => "aggregate",
            Action::GroupBy => "groupBy",
            Action::Raw => "raw",
        }
    }

    /// Whether the action writes data.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Action::Create
                | Action::CreateMany
                | Action::Update
                | Action::UpdateMany
                | Action::Delete
                | Action::DeleteMany
                | Action::Upsert
        )
    }

    /// Single or batch update: the actions that get column-change detection.
    pub fn is_update_shaped(self) -> bool {
        matches!(self, Action::Update | Action::UpdateMany)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    One(Record),
    Many(Vec<Record>),
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    /// Key of this function's object in an aggregate result (`_sum`, ...).
    pub fn key(self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Sum => "_sum",
            AggregateFn::Avg => "_avg",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
        }
    }
}

/// One aggregate over one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFn,
    pub field: String,
}

/// The single options object every action accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    /// Filtering, ordering, projection, relations and paging.
    pub query: QueryState,
    /// Payload for create/update actions.
    pub data: Option<Data>,
    /// Upsert: record to create when nothing matches.
    pub create: Option<Record>,
    /// Upsert: changes to apply when a record matches.
    pub update: Option<Record>,
    /// Aggregate action: requested aggregates.
    pub aggregates: Vec<Aggregate>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: QueryState) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(Data::One(data));
        self
    }

    pub fn with_many(mut self, data: Vec<Record>) -> Self {
        self.data = Some(Data::Many(data));
        self
    }

    pub fn with_upsert(mut self, create: Record, update: Record) -> Self {
        self.create = Some(create);
        self.update = Some(update);
        self
    }

    pub fn with_aggregate(mut self, func: AggregateFn, field: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate {
            func,
            field: field.into(),
        });
        self
    }

    /// Mutable access to the single-record payload (for before hooks).
    pub fn data_one_mut(&mut self) -> Option<&mut Record> {
        match &mut self.data {
            Some(Data::One(record)) => Some(record),
            _ => None,
        }
    }
}

/// Out-of-band per-call options. Never forwarded inside the data payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Skip column-change detection for this call only.
    pub skip_column_hooks: bool,
}

impl CallOptions {
    pub fn skip_column_hooks() -> Self {
        Self {
            skip_column_hooks: true,
        }
    }
}

/// One call flowing through the middleware chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Target model; `None` for raw statements.
    pub model: Option<String>,
    pub action: Action,
    pub args: Args,
    pub options: CallOptions,
}

impl Request {
    pub fn new(model: impl Into<String>, action: Action, args: Args) -> Self {
        Self {
            model: Some(model.into()),
            action,
            args,
            options: CallOptions::default(),
        }
    }

    /// A request without model context.
    pub fn raw(args: Args) -> Self {
        Self {
            model: None,
            action: Action::Raw,
            args,
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// `find_many`, `group_by`.
    Records(Vec<Record>),
    /// Single-record actions; `None` when nothing matched.
    Record(Option<Record>),
    /// `count` and batch writes.
    Count(u64),
    /// `aggregate`: `{"_sum": {"price": ..}, ...}`.
    Aggregate(Record),
}

impl Output {
    pub fn into_records(self) -> OrmResult<Vec<Record>> {
        match self {
            Output::Records(records) => Ok(records),
            Output::Record(record) => Ok(record.into_iter().collect()),
            other => Err(unexpected("records", &other)),
        }
    }

    pub fn into_record(self) -> OrmResult<Option<Record>> {
        match self {
            Output::Record(record) => Ok(record),
            Output::Records(records) => Ok(records.into_iter().next()),
            other => Err(unexpected("record", &other)),
        }
    }

    pub fn into_count(self) -> OrmResult<u64> {
        match self {
            Output::Count(n) => Ok(n),
            other => Err(unexpected("count", &other)),
        }
    }

    pub fn into_aggregate(self) -> OrmResult<Record> {
        match self {
            Output::Aggregate(record) => Ok(record),
            other => Err(unexpected("aggregate", &other)),
        }
    }

    /// Number of records this output carries or affected.
    pub fn affected(&self) -> u64 {
        match self {
            Output::Records(records) => records.len() as u64,
            Output::Record(record) => u64::from(record.is_some()),
            Output::Count(n) => *n,
            Output::Aggregate(_) => 0,
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Records(records) => write!(f, "{} records", records.len()),
            Output::Record(record) => {
                write!(f, "{}", if record.is_some() { "1 record" } else { "0 records" })
            }
            Output::Count(n) => write!(f, "count {n}"),
            Output::Aggregate(_) => write!(f, "aggregate"),
        }
    }
}

fn unexpected(expected: &str, got: &Output) -> OrmError {
    OrmError::engine(format!("expected {expected} output, got {got}"))
}

/// The underlying engine: executes one request.
///
/// Implementations must be shareable across tasks; hooks receive the engine
/// as an `Arc<dyn Engine>`.
pub trait Engine: Send + Sync {
    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, OrmResult<Output>>;
}

/// Engine handle passed to hooks.
pub type SharedEngine = Arc<dyn Engine>;

impl<E: Engine + ?Sized> Engine for Arc<E> {
    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, OrmResult<Output>> {
        (**self).execute(request)
    }
}

/// Per-model view over an engine.
///
/// Each method takes one [`Args`] object and returns a future.
#[derive(Clone, Copy)]
pub struct Delegate<'a> {
    engine: &'a dyn Engine,
    model: &'a str,
}

impl<'a> Delegate<'a> {
    pub fn new(engine: &'a dyn Engine, model: &'a str) -> Self {
        Self { engine, model }
    }

    pub fn model(&self) -> &str {
        self.model
    }

    async fn call(&self, action: Action, args: Args) -> OrmResult<Output> {
        self.engine
            .execute(Request::new(self.model, action, args))
            .await
    }

    pub async fn find_many(&self, args: Args) -> OrmResult<Vec<Record>> {
        self.call(Action::FindMany, args).await?.into_records()
    }

    pub async fn find_first(&self, args: Args) -> OrmResult<Option<Record>> {
        self.call(Action::FindFirst, args).await?.into_record()
    }

    pub async fn find_unique(&self, args: Args) -> OrmResult<Option<Record>> {
        self.call(Action::FindUnique, args).await?.into_record()
    }

    pub async fn create(&self, args: Args) -> OrmResult<Record> {
        required(self.call(Action::Create, args).await?, self.model)
    }

    pub async fn create_many(&self, args: Args) -> OrmResult<u64> {
        self.call(Action::CreateMany, args).await?.into_count()
    }

    pub async fn update(&self, args: Args) -> OrmResult<Record> {
        required(self.call(Action::Update, args).await?, self.model)
    }

    pub async fn update_many(&self, args: Args) -> OrmResult<u64> {
        self.call(Action::UpdateMany, args).await?.into_count()
    }

    pub async fn delete(&self, args: Args) -> OrmResult<Record> {
        required(self.call(Action::Delete, args).await?, self.model)
    }

    pub async fn delete_many(&self, args: Args) -> OrmResult<u64> {
        self.call(Action::DeleteMany, args).await?.into_count()
    }

    pub async fn upsert(&self, args: Args) -> OrmResult<Record> {
        required(self.call(Action::Upsert, args).await?, self.model)
    }

    pub async fn count(&self, args: Args) -> OrmResult<u64> {
        self.call(Action::Count, args).await?.into_count()
    }

    pub async fn aggregate(&self, args: Args) -> OrmResult<Record> {
        self.call(Action::Aggregate, args).await?.into_aggregate()
    }

    pub async fn group_by(&self, args: Args) -> OrmResult<Vec<Record>> {
        self.call(Action::GroupBy, args).await?.into_records()
    }
}

pub(crate) fn required(output: Output, model: &str) -> OrmResult<Record> {
    output
        .into_record()?
        .ok_or_else(|| OrmError::not_found(format!("no {model} record returned")))
}

/// Read a single aggregate value out of an aggregate result.
pub(crate) fn aggregate_value(result: &Record, func: AggregateFn, field: &str) -> Value {
    result
        .get(func.key())
        .and_then(Value::as_object)
        .and_then(|values| values.get(field))
        .cloned()
        .unwrap_or(Value::Null)
}
