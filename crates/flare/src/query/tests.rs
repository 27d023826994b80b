use super::*;
use crate::client::Client;
use crate::condition::{Combinator, Condition};
use crate::error::OrmError;
use crate::memory::MemoryEngine;
use crate::record;
use crate::registry::ModelRegistry;
use crate::value::Value;
use std::sync::Arc;

struct UserQuery(QueryBuilder);

impl Query for UserQuery {
    fn builder(&self) -> &QueryBuilder {
        &self.0
    }

    fn builder_mut(&mut self) -> &mut QueryBuilder {
        &mut self.0
    }

    fn from_builder(builder: QueryBuilder) -> Self {
        Self(builder)
    }
}

impl UserQuery {
    fn active(self) -> Self {
        self.where_(Condition::eq("status", "active"))
    }

    fn adults(self) -> Self {
        self.where_(Condition::gte("age", 18))
    }
}

struct PostQuery(QueryBuilder);

impl Query for PostQuery {
    fn builder(&self) -> &QueryBuilder {
        &self.0
    }

    fn builder_mut(&mut self) -> &mut QueryBuilder {
        &mut self.0
    }

    fn from_builder(builder: QueryBuilder) -> Self {
        Self(builder)
    }
}

impl PostQuery {
    fn published(self) -> Self {
        self.where_(Condition::eq("published", true))
    }
}

fn a() -> Condition {
    Condition::eq("a", 1)
}

fn b() -> Condition {
    Condition::eq("b", 2)
}

fn c() -> Condition {
    Condition::eq("c", 3)
}

// ==================== Composition ====================

#[test]
fn first_predicate_is_set_directly() {
    let q = QueryBuilder::new("user").where_(a());
    assert_eq!(q.get_query().where_clause, Some(a()));
}

#[test]
fn where_never_drops_predicates() {
    let q = QueryBuilder::new("user").where_(a()).and_where(b()).where_(c());
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::And(vec![Condition::And(vec![a(), b()]), c()]))
    );
}

#[test]
fn or_where_wraps_the_whole_tree() {
    let q = QueryBuilder::new("user").where_(a()).where_(b()).or_where(c());
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::Or(vec![Condition::And(vec![a(), b()]), c()]))
    );
}

#[test]
fn or_where_on_empty_builder_sets_directly() {
    let q = QueryBuilder::new("user").or_where(c());
    assert_eq!(q.get_query().where_clause, Some(c()));
}

#[test]
fn empty_predicates_are_ignored() {
    let q = QueryBuilder::new("user").where_(a()).where_(record! {});
    assert_eq!(q.get_query().where_clause, Some(a()));
}

#[test]
fn where_group_ands_the_group() {
    let q = QueryBuilder::new("user")
        .where_(a())
        .where_group(|g| g.where_(b()).or_where(c()));
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::And(vec![
            a(),
            Condition::Or(vec![b(), c()])
        ]))
    );
}

#[test]
fn or_where_group_ors_the_group() {
    let q = QueryBuilder::new("user")
        .where_(a())
        .or_where_group(|g| g.where_(b()).where_(c()));
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::Or(vec![
            a(),
            Condition::And(vec![b(), c()])
        ]))
    );
}

#[test]
fn empty_group_leaves_parent_unchanged() {
    let q = QueryBuilder::new("user").where_(a()).where_group(|g| g);
    assert_eq!(q.get_query().where_clause, Some(a()));

    let q = QueryBuilder::new("user").where_group_with(|g| g.limit(3), Combinator::Or);
    assert_eq!(q.get_query().where_clause, None);
}

#[test]
fn group_builder_keeps_the_builder_type() {
    let q = UserQuery::from_builder(QueryBuilder::new("user"))
        .where_(a())
        .or_where_group(|g| g.active().adults());
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::Or(vec![
            a(),
            Condition::And(vec![
                Condition::eq("status", "active"),
                Condition::gte("age", 18)
            ])
        ]))
    );
}

#[test]
fn group_starts_from_an_empty_state() {
    let q = QueryBuilder::new("user").where_(a()).limit(5).where_group(|g| {
        assert!(g.get_query().is_empty());
        g.where_(b())
    });
    assert_eq!(q.get_query().take, Some(5));
}

#[test]
fn clones_are_independent() {
    let base = QueryBuilder::new("user").where_(a()).include("posts");
    let extended = base.clone().where_(b()).include_with("comments", |c| c.limit(2));
    assert_eq!(base.get_query().where_clause, Some(a()));
    assert_eq!(base.get_query().include.len(), 1);
    assert_eq!(extended.get_query().include.len(), 2);
}

#[test]
fn with_id_rejects_falsy_ids() {
    for id in [Value::from(0), Value::from(""), Value::Null, Value::from(false)] {
        let err = QueryBuilder::new("user").with_id(id).unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(ref m) if m == "id is required"));
    }
}

#[test]
fn with_id_composes_an_id_filter() {
    let q = QueryBuilder::new("user").with_id(123).unwrap();
    assert_eq!(q.get_query().where_clause, Some(Condition::eq("id", 123)));

    let q = QueryBuilder::new("user").where_(a()).with_id("u-1").unwrap();
    assert_eq!(
        q.get_query().where_clause,
        Some(Condition::And(vec![a(), Condition::eq("id", "u-1")]))
    );
}

#[test]
fn first_and_last_order_and_limit() {
    let q = QueryBuilder::new("user").first("created_at");
    assert_eq!(q.get_query().order_by, vec![OrderBy::asc("created_at")]);
    assert_eq!(q.get_query().take, Some(1));

    let q = QueryBuilder::new("user").last("created_at");
    assert_eq!(q.get_query().order_by, vec![OrderBy::desc("created_at")]);
    assert_eq!(q.get_query().take, Some(1));
}

#[test]
fn when_applies_conditionally() {
    let q = QueryBuilder::new("user")
        .when(true, |q| q.where_(a()))
        .when(false, |q| q.where_(b()));
    assert_eq!(q.get_query().where_clause, Some(a()));
}

#[test]
fn skip_column_hooks_is_a_call_option() {
    let q = QueryBuilder::new("user").where_(a()).skip_column_hooks();
    assert!(q.builder().options().skip_column_hooks);
    assert_eq!(q.get_query().where_clause, Some(a()));
    assert!(!q.fresh().builder().options().skip_column_hooks);
}

// ==================== Relations ====================

#[test]
fn include_stores_all() {
    let q = QueryBuilder::new("user").include("posts");
    assert_eq!(q.get_query().include.get("posts"), Some(&Include::All));
}

#[test]
fn empty_nested_include_is_all() {
    let q = QueryBuilder::new("user").include_with("posts", |p| p);
    assert_eq!(q.get_query().include.get("posts"), Some(&Include::All));
}

#[test]
fn nested_includes_use_registered_builders() {
    let models = Arc::new(ModelRegistry::new());
    models.register::<PostQuery>("posts").unwrap();

    let q = QueryBuilder::new("user")
        .with_models(models)
        .include_with("posts", |p| {
            assert!(p.is::<PostQuery>());
            p.with(|p: PostQuery| p.published())
                .limit(5)
                .include_with("comments", |c| c.where_(Condition::eq("flagged", false)))
        });

    let Some(Include::Query(posts)) = q.get_query().include.get("posts") else {
        panic!("expected nested posts query");
    };
    assert_eq!(posts.where_clause, Some(Condition::eq("published", true)));
    assert_eq!(posts.take, Some(5));
    let Some(Include::Query(comments)) = posts.include.get("comments") else {
        panic!("expected nested comments query");
    };
    assert_eq!(comments.where_clause, Some(Condition::eq("flagged", false)));
}

#[test]
fn unregistered_relation_falls_back_to_generic_builder() {
    let q = QueryBuilder::new("user").include_with("tags", |t| {
        assert!(t.is::<QueryBuilder>());
        t.with(|p: PostQuery| p.published())
    });
    let Some(Include::Query(tags)) = q.get_query().include.get("tags") else {
        panic!("expected nested tags query");
    };
    assert_eq!(tags.where_clause, Some(Condition::eq("published", true)));
}

#[test]
fn relation_groups_stay_in_the_nested_builder() {
    let q = QueryBuilder::new("user").include_with("posts", |p| {
        p.where_(a()).or_where_group(|g| g.where_(b()).where_(c()))
    });
    let Some(Include::Query(posts)) = q.get_query().include.get("posts") else {
        panic!("expected nested posts query");
    };
    assert_eq!(
        posts.where_clause,
        Some(Condition::Or(vec![a(), Condition::And(vec![b(), c()])]))
    );
    assert_eq!(q.get_query().where_clause, None);
}

// ==================== Terminals ====================

fn seeded_client() -> Client {
    let engine = MemoryEngine::new().with_model("user");
    engine.seed(
        "user",
        vec![
            record! { "id" => 1, "name" => "ann", "status" => "active", "age" => 31 },
            record! { "id" => 2, "name" => "bob", "status" => "pending", "age" => 17 },
            record! { "id" => 3, "name" => "cyd", "status" => "active", "age" => 45 },
            record! { "id" => 4, "name" => "dee", "status" => "banned", "age" => 28 },
            record! { "id" => 5, "name" => "eve", "status" => "active", "age" => 22 },
        ],
    );
    Client::new(engine)
}

#[tokio::test]
async fn builder_without_client_is_missing_a_delegate() {
    let err = QueryBuilder::new("user").find_many().await.unwrap_err();
    assert!(matches!(err, OrmError::MissingDelegate(_)));
}

#[tokio::test]
async fn find_many_applies_filters_and_order() {
    let client = seeded_client();
    let rows = client
        .model("user")
        .where_(Condition::eq("status", "active"))
        .order_desc("age")
        .find_many()
        .await
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![Value::from("cyd"), Value::from("ann"), Value::from("eve")]);
}

#[tokio::test]
async fn or_where_matches_either_side() {
    let client = seeded_client();
    let count = client
        .model("user")
        .where_(Condition::eq("status", "active"))
        .where_(Condition::gte("age", 40))
        .or_where(Condition::eq("name", "bob"))
        .count()
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn first_last_pluck_and_only() {
    let client = seeded_client();
    let youngest = client.model("user").first("age").find_first().await.unwrap();
    assert_eq!(youngest.unwrap()["name"], Value::from("bob"));

    let oldest = client.model("user").last("age").only("name").await.unwrap();
    assert_eq!(oldest, Value::from("cyd"));

    let ids = client
        .model("user")
        .where_(Condition::eq("status", "active"))
        .order_asc("id")
        .pluck("id")
        .await
        .unwrap();
    assert_eq!(ids, vec![Value::from(1), Value::from(3), Value::from(5)]);
}

#[tokio::test]
async fn or_throw_variants_report_not_found() {
    let client = seeded_client();
    let err = client
        .model("user")
        .with_id(99)
        .unwrap()
        .find_unique_or_throw()
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(client.model("user").with_id(2).unwrap().find_first_or_throw().await.is_ok());
}

#[tokio::test]
async fn aggregates_and_exists() {
    let client = seeded_client();
    let users = client.model("user");
    assert_eq!(users.sum("age").await.unwrap(), Value::from(143));
    assert_eq!(users.min("age").await.unwrap(), Value::from(17));
    assert_eq!(users.max("age").await.unwrap(), Value::from(45));
    assert!(users.exists().await.unwrap());
    assert!(
        !users
            .fresh()
            .where_(Condition::eq("status", "gone"))
            .exists()
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn paginate_reports_meta() {
    let client = seeded_client();
    let page = client
        .model("user")
        .order_asc("id")
        .paginate(2, 2)
        .await
        .unwrap();
    let ids: Vec<_> = page.data.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![Value::from(3), Value::from(4)]);
    assert_eq!(
        page.meta,
        PageMeta {
            total: 5,
            last_page: 3,
            current_page: 2,
            per_page: 2,
            prev_page: Some(1),
            next_page: Some(3),
        }
    );

    let err = client.model("user").paginate(1, 0).await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
}

#[tokio::test]
async fn paginate_rejects_pages_past_the_offset_range() {
    let client = seeded_client();
    let err = client.model("user").paginate(u64::MAX, 2).await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));

    // The last representable page still works, it is just empty.
    let page = client.model("user").paginate(u64::MAX, 1).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.meta.total, 5);
}

#[tokio::test]
async fn chunk_walks_every_record() {
    let client = seeded_client();
    let mut sizes = Vec::new();
    let visited = client
        .model("user")
        .chunk(2, |rows| {
            sizes.push(rows.len());
            async { Ok::<(), OrmError>(()) }
        })
        .await
        .unwrap();
    assert_eq!(visited, 5);
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn grouped_counts_and_filters_by_having() {
    let client = seeded_client();
    let groups = client
        .model("user")
        .group_by(["status"])
        .having(Condition::gt("_count", 1))
        .grouped()
        .await
        .unwrap();
    assert_eq!(groups, vec![record! { "status" => "active", "_count" => 3 }]);

    let err = client.model("user").grouped().await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
}

#[tokio::test]
async fn writes_round_trip_through_the_client() {
    let client = seeded_client();
    let users = client.model("user");

    let created = users.create(record! { "name" => "fay", "status" => "pending" }).await.unwrap();
    assert_eq!(created["id"], Value::from(6));

    let updated = users
        .fresh()
        .with_id(6)
        .unwrap()
        .update(record! { "status" => "active" })
        .await
        .unwrap();
    assert_eq!(updated["status"], Value::from("active"));

    let n = users
        .fresh()
        .where_(Condition::eq("status", "pending"))
        .update_many(record! { "status" => "active" })
        .await
        .unwrap();
    assert_eq!(n, 1);

    let upserted = users
        .fresh()
        .with_id(42)
        .unwrap()
        .upsert(record! { "id" => 42, "name" => "gus" }, record! { "name" => "never" })
        .await
        .unwrap();
    assert_eq!(upserted["name"], Value::from("gus"));

    let deleted = users.fresh().with_id(42).unwrap().delete().await.unwrap();
    assert_eq!(deleted["name"], Value::from("gus"));
    assert_eq!(users.fresh().count().await.unwrap(), 6);
}
