//! Snapshot fetching and column-change detection.

use super::registry::ColumnChange;
use crate::condition::Condition;
use crate::engine::{Args, Delegate, Engine};
use crate::error::OrmResult;
use crate::query::{ID_FIELD, QueryState};
use crate::value::{Record, Value};
use std::collections::{BTreeSet, HashMap};

/// Records matching `where_clause`, projected onto `fields`.
pub(crate) async fn fetch_before(
    engine: &dyn Engine,
    model: &str,
    where_clause: Option<Condition>,
    fields: Vec<String>,
) -> OrmResult<Vec<Record>> {
    let query = QueryState {
        select: fields,
        ..QueryState::filtered(where_clause)
    };
    Delegate::new(engine, model)
        .find_many(Args::from_query(query))
        .await
}

/// Full records for `ids`.
///
/// Looked up by identity rather than the original filter, so records whose
/// filter field was changed by the update are still found.
pub(crate) async fn fetch_after(
    engine: &dyn Engine,
    model: &str,
    ids: Vec<Value>,
) -> OrmResult<Vec<Record>> {
    let query = QueryState::filtered(Some(Condition::in_list(ID_FIELD, ids)));
    Delegate::new(engine, model)
        .find_many(Args::from_query(query))
        .await
}

/// Non-null ids of a snapshot.
pub(crate) fn snapshot_ids(snapshot: &[Record]) -> Vec<Value> {
    snapshot
        .iter()
        .filter_map(|record| record.get(ID_FIELD))
        .filter(|id| !id.is_null())
        .cloned()
        .collect()
}

/// Compare `columns` between matching before/after records.
///
/// Records are matched by id; records missing from either side are ignored.
/// Missing fields count as `Null`, so `null -> null` is never a change.
pub fn detect_changes(
    model: &str,
    before: &[Record],
    after: &[Record],
    columns: &BTreeSet<String>,
) -> Vec<ColumnChange> {
    let previous: HashMap<String, &Record> = before
        .iter()
        .filter_map(|record| Some((record.get(ID_FIELD)?.identity_key(), record)))
        .collect();

    let mut changes = Vec::new();
    for current in after {
        let Some(old_record) = current
            .get(ID_FIELD)
            .and_then(|id| previous.get(&id.identity_key()))
        else {
            continue;
        };
        for column in columns {
            let old = old_record.get(column).cloned().unwrap_or_default();
            let new = current.get(column).cloned().unwrap_or_default();
            if !old.same(&new) {
                changes.push(ColumnChange {
                    model: model.to_string(),
                    column: column.clone(),
                    old,
                    new,
                    record: current.clone(),
                });
            }
        }
    }
    changes
}
