//! An in-process [`Engine`] over plain records.
//!
//! Evaluates conditions with [`Condition::matches`], supports every model
//! action and keeps a log of the calls it received. Relations in `include`
//! are not resolved. Meant for tests and prototyping.

use crate::condition::Condition;
use crate::engine::{Action, Aggregate, AggregateFn, Args, Data, Engine, Output, Request};
use crate::error::{OrmError, OrmResult};
use crate::query::{Direction, ID_FIELD, QueryState};
use crate::value::{Record, Value};
use futures_util::future::BoxFuture;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

/// One request as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub model: Option<String>,
    pub action: Action,
}

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
}

impl Table {
    fn next_id(&self) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(ID_FIELD).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn insert(&mut self, mut record: Record) -> OrmResult<Record> {
        match record.get(ID_FIELD) {
            None | Some(Value::Null) => {
                record.insert(ID_FIELD.to_string(), Value::Int(self.next_id()));
            }
            Some(id) => {
                if self
                    .rows
                    .iter()
                    .any(|row| row.get(ID_FIELD).is_some_and(|existing| existing.same(id)))
                {
                    return Err(OrmError::UniqueViolation(format!("duplicate id {id}")));
                }
            }
        }
        self.rows.push(record.clone());
        Ok(record)
    }

    fn matching(&self, where_clause: Option<&Condition>) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| where_clause.is_none_or(|c| c.matches(row)))
            .map(|(i, _)| i)
            .collect()
    }

    fn select(&self, query: &QueryState) -> Vec<Record> {
        let rows = self
            .matching(query.where_clause.as_ref())
            .into_iter()
            .map(|i| self.rows[i].clone())
            .collect();
        let mut rows = shape(rows, query);
        if !query.select.is_empty() {
            for row in &mut rows {
                row.retain(|field, _| query.select.contains(field));
            }
        }
        rows
    }
}

/// Order, de-duplicate and page rows.
fn shape(mut rows: Vec<Record>, query: &QueryState) -> Vec<Record> {
    if !query.order_by.is_empty() {
        rows.sort_by(|a, b| {
            for order in &query.order_by {
                let left = a.get(&order.field).unwrap_or(&Value::Null);
                let right = b.get(&order.field).unwrap_or(&Value::Null);
                let ordering = left.compare(right).unwrap_or(Ordering::Equal);
                let ordering = match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    if !query.distinct.is_empty() {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(group_key(row, &query.distinct)));
    }

    let skip = query.skip.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let take = query.take.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(take).collect()
}

fn group_key(row: &Record, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|field| row.get(field).unwrap_or(&Value::Null).identity_key())
        .collect()
}

fn apply(row: &mut Record, patch: &Record) {
    for (field, value) in patch {
        row.insert(field.clone(), value.clone());
    }
}

fn one(data: Option<Data>) -> OrmResult<Record> {
    match data {
        Some(Data::One(record)) => Ok(record),
        _ => Err(OrmError::invalid_argument("expected a single data record")),
    }
}

fn aggregate(rows: &[&Record], spec: &Aggregate) -> Value {
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.get(&spec.field))
        .filter(|value| !value.is_null())
        .collect();

    match spec.func {
        AggregateFn::Count => Value::Int(values.len() as i64),
        AggregateFn::Sum if values.is_empty() => Value::Null,
        AggregateFn::Sum => {
            if values.iter().all(|v| matches!(v, Value::Int(_))) {
                Value::Int(values.iter().filter_map(|v| v.as_i64()).sum())
            } else {
                Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
            }
        }
        AggregateFn::Avg if values.is_empty() => Value::Null,
        AggregateFn::Avg => {
            let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
            Value::Float(sum / values.len() as f64)
        }
        AggregateFn::Min => extreme(&values, Ordering::Less),
        AggregateFn::Max => extreme(&values, Ordering::Greater),
    }
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    values
        .iter()
        .copied()
        .fold(None::<&Value>, |best, value| match best {
            Some(best) if value.compare(best) != Some(wanted) => Some(best),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or_default()
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    calls: Vec<Call>,
    failing: BTreeSet<Action>,
}

/// In-memory engine.
///
/// ```ignore
/// let engine = MemoryEngine::new().with_model("user");
/// engine.seed("user", vec![record! { "id" => 1, "name" => "ann" }]);
/// let client = Client::new(engine);
/// ```
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty table for `model`.
    pub fn with_model(self, model: &str) -> Self {
        self.lock().tables.entry(model.to_lowercase()).or_default();
        self
    }

    /// Insert rows, creating the table if needed. Rows without an id get one.
    pub fn seed(&self, model: &str, rows: Vec<Record>) {
        let mut state = self.lock();
        let table = state.tables.entry(model.to_lowercase()).or_default();
        for row in rows {
            if let Err(error) = table.insert(row) {
                tracing::warn!(model, %error, "skipping seed row");
            }
        }
    }

    /// Current rows of `model`.
    pub fn rows(&self, model: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(&model.to_lowercase())
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of received requests for `action`.
    pub fn call_count(&self, action: Action) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.action == action)
            .count()
    }

    /// Make every subsequent `action` request fail with an engine error.
    pub fn fail_on(&self, action: Action) {
        self.lock().failing.insert(action);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, request: Request) -> OrmResult<Output> {
        let mut state = self.lock();
        state.calls.push(Call {
            model: request.model.clone(),
            action: request.action,
        });
        if state.failing.contains(&request.action) {
            return Err(OrmError::engine(format!("{} failed", request.action)));
        }
        let Some(model) = request.model else {
            return Err(OrmError::Unsupported(
                "raw statements are not supported by the memory engine".to_string(),
            ));
        };
        let table = state
            .tables
            .get_mut(&model.to_lowercase())
            .ok_or_else(|| OrmError::missing_delegate(&model))?;

        let Args {
            query,
            data,
            create,
            update,
            aggregates,
        } = request.args;

        match request.action {
            Action::FindMany => Ok(Output::Records(table.select(&query))),
            Action::FindFirst
            | Action::FindFirstOrThrow
            | Action::FindUnique
            | Action::FindUniqueOrThrow => Ok(Output::Record(table.select(&query).into_iter().next())),
            Action::Create => Ok(Output::Record(Some(table.insert(one(data)?)?))),
            Action::CreateMany => {
                let rows = match data {
                    Some(Data::Many(rows)) => rows,
                    Some(Data::One(row)) => vec![row],
                    None => Vec::new(),
                };
                let mut created = 0;
                for row in rows {
                    table.insert(row)?;
                    created += 1;
                }
                Ok(Output::Count(created))
            }
            Action::Update => {
                let patch = one(data)?;
                let index = table
                    .matching(query.where_clause.as_ref())
                    .first()
                    .copied()
                    .ok_or_else(|| OrmError::not_found(format!("no {model} record to update")))?;
                apply(&mut table.rows[index], &patch);
                Ok(Output::Record(Some(table.rows[index].clone())))
            }
            Action::UpdateMany => {
                let patch = one(data)?;
                let indexes = table.matching(query.where_clause.as_ref());
                for &index in &indexes {
                    apply(&mut table.rows[index], &patch);
                }
                Ok(Output::Count(indexes.len() as u64))
            }
            Action::Delete => {
                let index = table
                    .matching(query.where_clause.as_ref())
                    .first()
                    .copied()
                    .ok_or_else(|| OrmError::not_found(format!("no {model} record to delete")))?;
                Ok(Output::Record(Some(table.rows.remove(index))))
            }
            Action::DeleteMany => {
                let before = table.rows.len();
                if let Some(condition) = &query.where_clause {
                    table.rows.retain(|row| !condition.matches(row));
                } else {
                    table.rows.clear();
                }
                Ok(Output::Count((before - table.rows.len()) as u64))
            }
            Action::Upsert => match table.matching(query.where_clause.as_ref()).first() {
                Some(&index) => {
                    apply(&mut table.rows[index], &update.unwrap_or_default());
                    Ok(Output::Record(Some(table.rows[index].clone())))
                }
                None => Ok(Output::Record(Some(table.insert(create.unwrap_or_default())?))),
            },
            Action::Count => {
                let rows = table.select(&query);
                Ok(Output::Count(rows.len() as u64))
            }
            Action::Aggregate => {
                let indexes = table.matching(query.where_clause.as_ref());
                let rows: Vec<&Record> = indexes.iter().map(|&i| &table.rows[i]).collect();
                let mut result = Record::new();
                for spec in &aggregates {
                    let entry = result
                        .entry(spec.func.key().to_string())
                        .or_insert_with(|| Value::Object(Record::new()));
                    if let Value::Object(values) = entry {
                        values.insert(spec.field.clone(), aggregate(&rows, spec));
                    }
                }
                Ok(Output::Aggregate(result))
            }
            Action::GroupBy => {
                let mut groups: Vec<(Vec<String>, Record)> = Vec::new();
                for index in table.matching(query.where_clause.as_ref()) {
                    let row = &table.rows[index];
                    let key = group_key(row, &query.group_by);
                    match groups.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, group)) => {
                            let count = group.get("_count").and_then(Value::as_i64).unwrap_or(0);
                            group.insert("_count".to_string(), Value::Int(count + 1));
                        }
                        None => {
                            let mut group: Record = query
                                .group_by
                                .iter()
                                .map(|field| {
                                    (field.clone(), row.get(field).cloned().unwrap_or_default())
                                })
                                .collect();
                            group.insert("_count".to_string(), Value::Int(1));
                            groups.push((key, group));
                        }
                    }
                }
                let rows = groups
                    .into_iter()
                    .map(|(_, group)| group)
                    .filter(|group| query.having.as_ref().is_none_or(|c| c.matches(group)))
                    .collect();
                Ok(Output::Records(shape(rows, &query)))
            }
            Action::Raw => Err(OrmError::Unsupported(
                "raw statements are not supported by the memory engine".to_string(),
            )),
        }
    }
}

impl Engine for MemoryEngine {
    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, OrmResult<Output>> {
        Box::pin(async move { self.run(request) })
    }
}
