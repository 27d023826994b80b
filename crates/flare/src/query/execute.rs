//! Terminal operations.
//!
//! Every terminal forwards one [`Request`] to the builder's [`Client`](crate::Client),
//! so the middleware chain (hooks included) sees builder calls exactly like
//! direct engine calls.

use super::builder::QueryBuilder;
use super::compose::Query;
use super::state::OrderBy;
use super::ID_FIELD;
use crate::engine::{Action, AggregateFn, Args, Engine, Output, Request, aggregate_value, required};
use crate::error::{OrmError, OrmResult};
use crate::value::{Record, Value};
use serde::Serialize;
use std::future::Future;

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub last_page: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
}

impl PageMeta {
    /// Compute metadata for `page` (1-based) of `total` records.
    pub fn new(total: u64, page: u64, per_page: u64) -> Self {
        let last_page = total.div_ceil(per_page).max(1);
        Self {
            total,
            last_page,
            current_page: page,
            per_page,
            prev_page: (page > 1).then(|| page - 1),
            next_page: (page < last_page).then(|| page + 1),
        }
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<Record>,
    pub meta: PageMeta,
}

/// Async terminals, available on every [`Query`] builder.
pub trait Execute: Query {
    /// All matching records.
    fn find_many(&self) -> impl Future<Output = OrmResult<Vec<Record>>> + Send {
        async move {
            dispatch(self.builder(), Action::FindMany, self.args())
                .await?
                .into_records()
        }
    }

    /// First matching record.
    fn find_first(&self) -> impl Future<Output = OrmResult<Option<Record>>> + Send {
        async move {
            dispatch(self.builder(), Action::FindFirst, self.args())
                .await?
                .into_record()
        }
    }

    /// Record matching a unique filter.
    fn find_unique(&self) -> impl Future<Output = OrmResult<Option<Record>>> + Send {
        async move {
            dispatch(self.builder(), Action::FindUnique, self.args())
                .await?
                .into_record()
        }
    }

    /// Like [`Execute::find_first`], failing with `NotFound` when nothing matches.
    fn find_first_or_throw(&self) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let output = dispatch(self.builder(), Action::FindFirstOrThrow, self.args()).await?;
            required(output, self.model_name())
        }
    }

    /// Like [`Execute::find_unique`], failing with `NotFound` when nothing matches.
    fn find_unique_or_throw(&self) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let output = dispatch(self.builder(), Action::FindUniqueOrThrow, self.args()).await?;
            required(output, self.model_name())
        }
    }

    fn create(&self, data: Record) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let args = Args::new().with_data(data);
            let output = dispatch(self.builder(), Action::Create, args).await?;
            required(output, self.model_name())
        }
    }

    /// Insert several records; returns how many were created.
    fn create_many(&self, data: Vec<Record>) -> impl Future<Output = OrmResult<u64>> + Send {
        async move {
            let args = Args::new().with_many(data);
            dispatch(self.builder(), Action::CreateMany, args)
                .await?
                .into_count()
        }
    }

    /// Update the single matching record.
    fn update(&self, data: Record) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let args = self.args().with_data(data);
            let output = dispatch(self.builder(), Action::Update, args).await?;
            required(output, self.model_name())
        }
    }

    /// Update every matching record; returns how many were updated.
    fn update_many(&self, data: Record) -> impl Future<Output = OrmResult<u64>> + Send {
        async move {
            let args = self.args().with_data(data);
            dispatch(self.builder(), Action::UpdateMany, args)
                .await?
                .into_count()
        }
    }

    fn delete(&self) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let output = dispatch(self.builder(), Action::Delete, self.args()).await?;
            required(output, self.model_name())
        }
    }

    fn delete_many(&self) -> impl Future<Output = OrmResult<u64>> + Send {
        async move {
            dispatch(self.builder(), Action::DeleteMany, self.args())
                .await?
                .into_count()
        }
    }

    /// Update the matching record, or create one when nothing matches.
    fn upsert(
        &self,
        create: Record,
        update: Record,
    ) -> impl Future<Output = OrmResult<Record>> + Send {
        async move {
            let args = self.args().with_upsert(create, update);
            let output = dispatch(self.builder(), Action::Upsert, args).await?;
            required(output, self.model_name())
        }
    }

    fn count(&self) -> impl Future<Output = OrmResult<u64>> + Send {
        async move {
            dispatch(self.builder(), Action::Count, self.args())
                .await?
                .into_count()
        }
    }

    /// `true` when at least one record matches.
    fn exists(&self) -> impl Future<Output = OrmResult<bool>> + Send {
        async move { Ok(self.count().await? > 0) }
    }

    fn sum(&self, field: &str) -> impl Future<Output = OrmResult<Value>> + Send {
        self.aggregate(AggregateFn::Sum, field)
    }

    fn avg(&self, field: &str) -> impl Future<Output = OrmResult<Value>> + Send {
        self.aggregate(AggregateFn::Avg, field)
    }

    fn min(&self, field: &str) -> impl Future<Output = OrmResult<Value>> + Send {
        self.aggregate(AggregateFn::Min, field)
    }

    fn max(&self, field: &str) -> impl Future<Output = OrmResult<Value>> + Send {
        self.aggregate(AggregateFn::Max, field)
    }

    /// Run one aggregate over `field`; `Null` when there is nothing to aggregate.
    fn aggregate(
        &self,
        func: AggregateFn,
        field: &str,
    ) -> impl Future<Output = OrmResult<Value>> + Send {
        async move {
            let args = self.args().with_aggregate(func, field);
            let result = dispatch(self.builder(), Action::Aggregate, args)
                .await?
                .into_aggregate()?;
            Ok(aggregate_value(&result, func, field))
        }
    }

    /// Values of one field across all matching records.
    fn pluck(&self, field: &str) -> impl Future<Output = OrmResult<Vec<Value>>> + Send {
        async move {
            let mut args = self.args();
            args.query.select = vec![field.to_string()];
            let records = dispatch(self.builder(), Action::FindMany, args)
                .await?
                .into_records()?;
            Ok(records
                .into_iter()
                .map(|mut record| record.remove(field).unwrap_or_default())
                .collect())
        }
    }

    /// One field of the first matching record; `Null` when nothing matches.
    fn only(&self, field: &str) -> impl Future<Output = OrmResult<Value>> + Send {
        async move {
            let mut args = self.args();
            args.query.select = vec![field.to_string()];
            let record = dispatch(self.builder(), Action::FindFirst, args)
                .await?
                .into_record()?;
            Ok(record
                .and_then(|mut record| record.remove(field))
                .unwrap_or_default())
        }
    }

    /// Fetch page `page` (1-based, clamped to 1) of `per_page` records.
    fn paginate(&self, page: u64, per_page: u64) -> impl Future<Output = OrmResult<Page>> + Send {
        async move {
            if per_page == 0 {
                return Err(OrmError::invalid_argument("per_page must be greater than 0"));
            }
            let page = page.max(1);
            let offset = (page - 1)
                .checked_mul(per_page)
                .ok_or_else(|| OrmError::invalid_argument("page out of range"))?;

            let mut count_args = self.args();
            count_args.query.skip = None;
            count_args.query.take = None;
            let total = dispatch(self.builder(), Action::Count, count_args)
                .await?
                .into_count()?;

            let mut args = self.args();
            args.query.skip = Some(offset);
            args.query.take = Some(per_page);
            let data = dispatch(self.builder(), Action::FindMany, args)
                .await?
                .into_records()?;

            Ok(Page {
                data,
                meta: PageMeta::new(total, page, per_page),
            })
        }
    }

    /// Walk all matching records in chunks of `size`, calling `f` per chunk.
    ///
    /// Without an explicit order the walk is ordered by `id`. Stops after the
    /// first short chunk. Returns the number of records visited.
    fn chunk<F, Fut>(&self, size: u64, mut f: F) -> impl Future<Output = OrmResult<u64>> + Send
    where
        F: FnMut(Vec<Record>) -> Fut + Send,
        Fut: Future<Output = OrmResult<()>> + Send,
    {
        async move {
            if size == 0 {
                return Err(OrmError::invalid_argument("chunk size must be greater than 0"));
            }
            let mut base = self.args();
            if base.query.order_by.is_empty() {
                base.query.order_by.push(OrderBy::asc(ID_FIELD));
            }

            let mut visited = 0;
            loop {
                let mut args = base.clone();
                args.query.skip = Some(visited);
                args.query.take = Some(size);
                let records = dispatch(self.builder(), Action::FindMany, args)
                    .await?
                    .into_records()?;
                let fetched = records.len() as u64;
                if fetched > 0 {
                    f(records).await?;
                }
                visited += fetched;
                if fetched < size {
                    return Ok(visited);
                }
            }
        }
    }

    /// Group-by rows (`group_by` fields plus `_count`), filtered by `having`.
    fn grouped(&self) -> impl Future<Output = OrmResult<Vec<Record>>> + Send {
        async move {
            if self.get_query().group_by.is_empty() {
                return Err(OrmError::invalid_argument("group_by requires at least one field"));
            }
            dispatch(self.builder(), Action::GroupBy, self.args())
                .await?
                .into_records()
        }
    }

    /// Current state as request arguments.
    fn args(&self) -> Args {
        Args::from_query(self.get_query().clone())
    }

    fn model_name(&self) -> &str {
        self.builder().model().unwrap_or_default()
    }
}

impl<Q: Query> Execute for Q {}

async fn dispatch(builder: &QueryBuilder, action: Action, args: Args) -> OrmResult<Output> {
    let (Some(model), Some(client)) = (builder.model(), builder.client()) else {
        let model = builder.model().unwrap_or("<unscoped>");
        return Err(OrmError::missing_delegate(model));
    };
    let request = Request::new(model, action, args).with_options(builder.options());
    client.execute(request).await
}
