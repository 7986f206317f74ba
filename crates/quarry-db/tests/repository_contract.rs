//! Repository contract tests.
//!
//! Every check is a generic function over [`Store`] and runs twice: once
//! against `MemoryStore` and once against an in-memory SQLite database.

use std::ops::ControlFlow;

use serde_json::{json, Value};

use quarry_core::{
    Attributes, EntityId, EntityKind, Filter, OrderBy, PivotTable, RelationDescriptor, Schema,
};
use quarry_db::{
    Database, DbConfig, DbError, EntityRepository, Lookup, MemoryStore, Repository, SqliteStore,
    Store, SyncItem, Target,
};

// =============================================================================
// Fixtures
// =============================================================================

fn schema() -> Schema {
    Schema::builder()
        .kind(
            EntityKind::new("users")
                .fillable(["name", "email", "status"])
                .required(["name"])
                .unique(["email"])
                .relation(RelationDescriptor::has_many("posts", "posts", "user_id"))
                .relation(RelationDescriptor::has_one("profile", "profiles", "user_id"))
                .relation(RelationDescriptor::belongs_to_many(
                    "roles",
                    "roles",
                    PivotTable::new("role_user", "user_id", "role_id").with_timestamps(),
                )),
        )
        .kind(
            EntityKind::new("posts")
                .fillable(["title", "status"])
                .required(["title"])
                .relation(RelationDescriptor::belongs_to("author", "users", "user_id")),
        )
        .kind(
            EntityKind::new("profiles")
                .unguarded()
                .relation(RelationDescriptor::belongs_to("user", "users", "user_id")),
        )
        .kind(
            EntityKind::new("roles")
                .fillable(["name"])
                .relation(RelationDescriptor::belongs_to_many(
                    "users",
                    "users",
                    PivotTable::new("role_user", "role_id", "user_id").with_timestamps(),
                )),
        )
        .build()
        .unwrap()
}

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn memory_store() -> MemoryStore {
    MemoryStore::new(schema())
}

async fn sqlite_store() -> SqliteStore {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.store(schema())
}

fn repo<S: Store>(store: &S, kind: &str) -> EntityRepository<S> {
    EntityRepository::new(store.clone(), kind).unwrap()
}

async fn seed_users<S: Store>(users: &EntityRepository<S>, count: usize) -> Vec<EntityId> {
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let user = users
            .create(attrs(json!({ "name": format!("user {}", n), "email": format!("u{}@x.test", n) })))
            .await
            .unwrap();
        ids.push(user.id().unwrap());
    }
    ids
}

fn names(entities: &[quarry_core::Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.get("name").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Reads
// =============================================================================

async fn create_then_get_returns_given_attributes<S: Store>(store: S) {
    let users = repo(&store, "users");

    let created = users
        .create(attrs(json!({ "name": "a", "email": "a@x.test", "status": "active" })))
        .await
        .unwrap();
    assert_eq!(created.id(), Some(EntityId::new(1)));
    assert!(created.exists());

    let fetched = users.get_by_id(EntityId::new(1), &[]).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("a")));
    assert_eq!(fetched.get("email"), Some(&json!("a@x.test")));
    assert_eq!(fetched.get("status"), Some(&json!("active")));
    assert!(fetched.created_at().is_some());
}

async fn delete_then_optional_get_is_missing<S: Store>(store: S) {
    let users = repo(&store, "users");
    users.create(attrs(json!({ "name": "a" }))).await.unwrap();

    let removed = users.delete(Target::from(EntityId::new(1))).await.unwrap();
    assert_eq!(removed, Some(true));

    let fetched = users
        .get(Some(EntityId::new(1)), &[], Lookup::Optional)
        .await
        .unwrap();
    assert!(fetched.is_missing());

    let err = users.get(Some(EntityId::new(1)), &[], Lookup::Required).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No query results for kind [users] 1");
}

async fn get_without_id_returns_everything<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 3).await;

    let all = users.get(None, &[], Lookup::Required).await.unwrap().into_collection();
    assert_eq!(names(&all), vec!["user 0", "user 1", "user 2"]);

    let empty = repo(&store, "roles").all(&[]).await.unwrap();
    assert!(empty.is_empty());
}

async fn get_where_fails_only_when_required_and_empty<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 2).await;

    let err = users
        .get_where("name", json!("nobody"), Vec::new(), Lookup::Required, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let empty = users
        .get_where("name", json!("nobody"), Vec::new(), Lookup::Optional, None)
        .await
        .unwrap();
    assert!(empty.is_empty());

    let found = users
        .get_where("name", json!("user 1"), Vec::new(), Lookup::Required, None)
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["user 1"]);
}

async fn get_where_defaults_to_newest_first<S: Store>(store: S) {
    let users = repo(&store, "users");
    for n in 0..3 {
        users
            .create(attrs(json!({ "name": format!("user {}", n), "status": "active" })))
            .await
            .unwrap();
    }
    users
        .create(attrs(json!({ "name": "idle", "status": "idle" })))
        .await
        .unwrap();

    let newest_first = users
        .get_where("status", json!("active"), Vec::new(), Lookup::Required, None)
        .await
        .unwrap();
    assert_eq!(names(&newest_first), vec!["user 2", "user 1", "user 0"]);

    let by_name = users
        .get_where(
            "status",
            json!("active"),
            vec![Filter::Ne("name".into(), json!("user 1"))],
            Lookup::Required,
            Some(OrderBy::asc("name")),
        )
        .await
        .unwrap();
    assert_eq!(names(&by_name), vec!["user 0", "user 2"]);
}

async fn get_where_in_is_membership<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 4).await;

    let found = users
        .get_where_in(
            "name",
            vec![json!("user 3"), json!("user 1"), json!("ghost")],
            Vec::new(),
            Lookup::Required,
            None,
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["user 1", "user 3"]);

    let err = users
        .get_where_in("name", Vec::new(), Vec::new(), Lookup::Required, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let empty = users
        .get_where_in("name", vec![json!("ghost")], Vec::new(), Lookup::Optional, None)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

async fn first_where_names_the_hint<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 2).await;

    let found = users
        .first_where("email", json!("u1@x.test"), Vec::new(), Lookup::Required, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("name"), Some(&json!("user 1")));

    let err = users
        .first_where("email", json!("none"), Vec::new(), Lookup::Required, Some("user"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No user record found.");

    let err = users
        .first_where("email", json!("none"), Vec::new(), Lookup::Required, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No record found.");

    let absent = users
        .first_where("email", json!("none"), Vec::new(), Lookup::Optional, Some("user"))
        .await
        .unwrap();
    assert!(absent.is_none());
}

async fn paginate_reports_metadata<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 12).await;

    let first = users.paginate(5).await.unwrap();
    assert_eq!(first.current_page, 1);
    assert_eq!(first.per_page, 5);
    assert_eq!(first.total, 12);
    assert_eq!(first.last_page(), 3);
    assert_eq!(names(&first.items)[0], "user 11");

    let last = users.paginate_at(5, 3).await.unwrap();
    assert_eq!(last.count(), 2);
    assert!(!last.has_more_pages());

    let err = users.paginate(0).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)), "got {err:?}");
    let err = users.paginate_at(5, 0).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)), "got {err:?}");
    let err = users.chunk(0, |_, _| ControlFlow::Continue(())).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)), "got {err:?}");
}

async fn paginate_past_the_end_is_empty<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 3).await;

    let beyond = users.paginate_at(10, 2).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 3);

    let far = users.paginate_at(10, u64::MAX).await.unwrap();
    assert!(far.items.is_empty());
    assert_eq!(far.current_page, u64::MAX);

    let far = users.query().offset(u64::MAX).limit(u64::MAX).get().await.unwrap();
    assert!(far.is_empty());
}

async fn chunk_visits_every_page_once<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 7).await;

    let mut calls = Vec::new();
    let finished = users
        .chunk(3, |page, number| {
            calls.push((number, page.len()));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert!(finished);
    assert_eq!(calls, vec![(1, 3), (2, 3), (3, 1)]);

    let mut seen = 0;
    let finished = users
        .chunk(3, |page, _| {
            seen += page.len();
            ControlFlow::Break(())
        })
        .await
        .unwrap();
    assert!(!finished);
    assert_eq!(seen, 3);

    let mut none = 0;
    let finished = repo(&store, "roles")
        .chunk(3, |_, _| {
            none += 1;
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert!(finished);
    assert_eq!(none, 0);
}

async fn chunk_stops_cleanly_on_an_exact_multiple<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 6).await;

    let mut calls = Vec::new();
    let finished = users
        .chunk(3, |page, number| {
            calls.push((number, names(&page)));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert!(finished);
    assert_eq!(
        calls,
        vec![
            (1, vec!["user 0".to_string(), "user 1".into(), "user 2".into()]),
            (2, vec!["user 3".to_string(), "user 4".into(), "user 5".into()]),
        ]
    );
}

async fn id_filters_compare_by_json_type<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 2).await;

    let by_number = users
        .query()
        .filter(Filter::Eq("id".into(), json!(1)))
        .get()
        .await
        .unwrap();
    assert_eq!(names(&by_number), vec!["user 0"]);

    let by_string = users
        .query()
        .filter(Filter::Eq("id".into(), json!("1")))
        .get()
        .await
        .unwrap();
    assert!(by_string.is_empty());

    let listed = users
        .query()
        .where_in("id", [json!("1"), json!(2)])
        .get()
        .await
        .unwrap();
    assert_eq!(names(&listed), vec!["user 1"]);
}

async fn query_handle_composes_filters<S: Store>(store: S) {
    let users = repo(&store, "users");
    seed_users(&users, 5).await;
    users
        .force_update(Target::from(EntityId::new(2)), attrs(json!({ "score": 10 })))
        .await
        .unwrap();
    users
        .force_update(Target::from(EntityId::new(4)), attrs(json!({ "score": 30 })))
        .await
        .unwrap();

    let scored = users.query().where_gte("score", 10).oldest().get().await.unwrap();
    assert_eq!(names(&scored), vec!["user 1", "user 3"]);

    let unscored = users.query().where_null("score").count().await.unwrap();
    assert_eq!(unscored, 3);

    assert!(users.query().where_gt("score", 20).exists().await.unwrap());
    assert!(!users.query().where_gt("score", 30).exists().await.unwrap());
}

// =============================================================================
// Writes
// =============================================================================

async fn create_validates_required_and_unique<S: Store>(store: S) {
    let users = repo(&store, "users");

    let err = users.create(attrs(json!({ "email": "a@x.test" }))).await.unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));

    users
        .create(attrs(json!({ "name": "a", "email": "a@x.test" })))
        .await
        .unwrap();
    let err = users
        .create(attrs(json!({ "name": "b", "email": "a@x.test" })))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
}

async fn first_or_new_never_persists<S: Store>(store: S) {
    let users = repo(&store, "users");

    let fresh = users
        .first_or_new(attrs(json!({ "name": "a" })), attrs(json!({ "status": "new" })))
        .await
        .unwrap();
    assert!(!fresh.exists());
    assert_eq!(fresh.get("status"), Some(&json!("new")));
    assert_eq!(users.query().count().await.unwrap(), 0);

    let created = users
        .first_or_create(attrs(json!({ "name": "a" })), attrs(json!({ "status": "new" })))
        .await
        .unwrap();
    assert!(created.exists());

    let again = users
        .first_or_create(attrs(json!({ "name": "a" })), attrs(json!({ "status": "other" })))
        .await
        .unwrap();
    assert_eq!(again.id(), created.id());
    assert_eq!(again.get("status"), Some(&json!("new")));
}

async fn update_or_create_keeps_one_identity<S: Store>(store: S) {
    let users = repo(&store, "users");

    let first = users
        .update_or_create(attrs(json!({ "email": "a@x.test" })), attrs(json!({ "name": "first" })))
        .await
        .unwrap();
    let second = users
        .update_or_create(attrs(json!({ "email": "a@x.test" })), attrs(json!({ "name": "second" })))
        .await
        .unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(users.query().count().await.unwrap(), 1);

    let stored = users.get_by_id(first.id().unwrap(), &[]).await.unwrap();
    assert_eq!(stored.get("name"), Some(&json!("second")));
}

async fn update_applies_only_fillable_fields<S: Store>(store: S) {
    let users = repo(&store, "users");
    let mut user = users
        .create(attrs(json!({ "name": "a", "is_admin": true })))
        .await
        .unwrap();
    assert_eq!(user.get("is_admin"), None);

    let changed = users
        .update(Target::from(&mut user), attrs(json!({ "is_admin": true, "id": 99 })))
        .await
        .unwrap();
    assert!(!changed);

    let changed = users
        .update(Target::from(&mut user), attrs(json!({ "name": "b" })))
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(user.get("name"), Some(&json!("b")));
    assert_eq!(user.id(), Some(EntityId::new(1)));

    let unchanged = users
        .update(Target::from(EntityId::new(1)), attrs(json!({ "name": "b" })))
        .await
        .unwrap();
    assert!(!unchanged);

    let forced = users
        .force_update(Target::from(EntityId::new(1)), attrs(json!({ "is_admin": true, "id": 99 })))
        .await
        .unwrap();
    assert!(forced);

    let stored = users.get_by_id(EntityId::new(1), &[]).await.unwrap();
    assert_eq!(stored.get("is_admin"), Some(&json!(true)));
    assert_eq!(stored.id(), Some(EntityId::new(1)));
}

async fn update_by_unknown_id_is_not_found<S: Store>(store: S) {
    let users = repo(&store, "users");
    let err = users
        .update(Target::from(EntityId::new(42)), attrs(json!({ "name": "x" })))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mut unsaved = users.new_instance(attrs(json!({ "name": "x" })), false);
    let changed = users
        .update(Target::from(&mut unsaved), attrs(json!({ "name": "y" })))
        .await
        .unwrap();
    assert!(!changed);
}

async fn delete_respects_references<S: Store>(store: S) {
    let users = repo(&store, "users");
    let user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    users
        .create_relationally(&user, "posts", attrs(json!({ "title": "hello" })))
        .await
        .unwrap();

    let err = users.delete(Target::from(user.id().unwrap())).await.unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation(_)));

    let mut unsaved = users.new_instance(attrs(json!({ "name": "b" })), false);
    assert_eq!(users.delete(Target::from(&mut unsaved)).await.unwrap(), None);

    let mut lonely = users.create(attrs(json!({ "name": "c" }))).await.unwrap();
    assert_eq!(users.delete(Target::from(&mut lonely)).await.unwrap(), Some(true));
    assert!(!lonely.exists());
}

// =============================================================================
// Relations
// =============================================================================

async fn sync_makes_membership_exact<S: Store>(store: S) {
    let users = repo(&store, "users");
    let roles = repo(&store, "roles");
    let mut user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    for name in ["admin", "editor", "viewer"] {
        roles.create(attrs(json!({ "name": name }))).await.unwrap();
    }

    users
        .attach(&user, "roles", &[EntityId::new(1), EntityId::new(2)], Attributes::new(), true)
        .await
        .unwrap();

    let changes = users
        .sync(&user, "roles", vec![SyncItem::from(EntityId::new(2)), SyncItem::from(EntityId::new(3))])
        .await
        .unwrap();
    assert_eq!(changes.attached, vec![EntityId::new(3)]);
    assert_eq!(changes.detached, vec![EntityId::new(1)]);
    assert!(changes.updated.is_empty());

    users.load(&mut user, &["roles"]).await.unwrap();
    let mut ids = user.relation("roles").unwrap().ids();
    ids.sort();
    assert_eq!(ids, vec![EntityId::new(2), EntityId::new(3)]);

    let changes = users
        .sync(
            &user,
            "roles",
            vec![SyncItem::with_attributes(EntityId::new(3), attrs(json!({ "scope": "all" })))],
        )
        .await
        .unwrap();
    assert_eq!(changes.detached, vec![EntityId::new(2)]);
    assert_eq!(changes.updated, vec![EntityId::new(3)]);

    users.load(&mut user, &["roles"]).await.unwrap();
    let loaded = user.relation("roles").unwrap().entities();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].pivot().unwrap().get("scope"), Some(&json!("all")));

    let level = |value: Value| {
        vec![SyncItem::with_attributes(EntityId::new(3), attrs(json!({ "level": value })))]
    };
    let changes = users.sync(&user, "roles", level(json!(2))).await.unwrap();
    assert_eq!(changes.updated, vec![EntityId::new(3)]);
    let changes = users.sync(&user, "roles", level(json!(2.0))).await.unwrap();
    assert!(changes.updated.is_empty(), "{changes:?}");
    assert!(changes.attached.is_empty() && changes.detached.is_empty());

    let cleared = users.sync(&user, "roles", Vec::new()).await.unwrap();
    assert_eq!(cleared.detached, vec![EntityId::new(3)]);
}

async fn sync_rejects_unknown_ids_before_changing_anything<S: Store>(store: S) {
    let users = repo(&store, "users");
    let roles = repo(&store, "roles");
    let user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    roles.create(attrs(json!({ "name": "admin" }))).await.unwrap();
    users.sync(&user, "roles", vec![SyncItem::from(EntityId::new(1))]).await.unwrap();

    let err = users
        .sync(&user, "roles", vec![SyncItem::from(EntityId::new(7))])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation(_)));

    let still = users.sync(&user, "roles", vec![SyncItem::from(EntityId::new(1))]).await.unwrap();
    assert_eq!(still, Default::default());
}

async fn attach_and_detach_count_members<S: Store>(store: S) {
    let users = repo(&store, "users");
    let roles = repo(&store, "roles");
    let user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    for name in ["admin", "editor", "viewer"] {
        roles.create(attrs(json!({ "name": name }))).await.unwrap();
    }
    let all = [EntityId::new(1), EntityId::new(2), EntityId::new(3)];

    let attached = users
        .attach(&user, "roles", &all[..2], attrs(json!({ "granted_by": "seed" })), false)
        .await
        .unwrap();
    assert_eq!(attached.len(), 2);

    let again = users
        .attach(&user, "roles", &all, Attributes::new(), false)
        .await
        .unwrap();
    assert_eq!(again, vec![EntityId::new(3)]);

    let removed = users
        .detach(&user, "roles", Some(&all[..1]), false)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let removed = users.detach(&user, "roles", None, true).await.unwrap();
    assert_eq!(removed, 2);

    let err = users
        .attach(&user, "posts", &all, Attributes::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));

    let unsaved = users.new_instance(attrs(json!({ "name": "x" })), false);
    let err = users.detach(&unsaved, "roles", None, false).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

async fn has_relations_is_an_or_across_relations<S: Store>(store: S) {
    let users = repo(&store, "users");
    let with_post = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    let bare = users.create(attrs(json!({ "name": "b" }))).await.unwrap();
    users
        .create_relationally(&with_post, "posts", attrs(json!({ "title": "t" })))
        .await
        .unwrap();

    let a = with_post.id().unwrap();
    let b = bare.id().unwrap();

    assert!(users.has_relations(a, &["posts", "roles"]).await.unwrap());
    assert!(users.has_relations(a, &["roles", "posts"]).await.unwrap());
    assert!(!users.has_relations(a, &["roles"]).await.unwrap());
    assert!(!users.has_relations(b, &["posts", "roles"]).await.unwrap());

    let by_name = users
        .has_relations_by("name", json!("a"), &["posts"])
        .await
        .unwrap();
    assert!(by_name);

    let err = users.has_relations(a, &[]).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

async fn load_resolves_nested_relations<S: Store>(store: S) {
    let users = repo(&store, "users");
    let posts = repo(&store, "posts");
    let user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();
    for title in ["one", "two"] {
        users
            .create_relationally(&user, "posts", attrs(json!({ "title": title })))
            .await
            .unwrap();
    }

    let with_posts = users.all(&["posts", "profile"]).await.unwrap();
    assert_eq!(with_posts[0].relation("posts").unwrap().entities().len(), 2);
    assert!(with_posts[0].relation("profile").unwrap().is_empty());

    let mut post = posts.get_by_id(EntityId::new(1), &[]).await.unwrap();
    posts.load(&mut post, &["author.posts"]).await.unwrap();
    let author = post.relation("author").unwrap().entities()[0].clone();
    assert_eq!(author.get("name"), Some(&json!("a")));
    assert_eq!(author.relation("posts").unwrap().entities().len(), 2);

    let err = posts.load(&mut post, &["comments"]).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

async fn create_relationally_links_the_new_entity<S: Store>(store: S) {
    let users = repo(&store, "users");
    let user = users.create(attrs(json!({ "name": "a" }))).await.unwrap();

    let post = users
        .create_relationally(&user, "posts", attrs(json!({ "title": "t", "user_id": 99 })))
        .await
        .unwrap();
    assert_eq!(post.get("user_id"), Some(&json!(1)));

    let role = users
        .create_relationally(&user, "roles", attrs(json!({ "name": "admin" })))
        .await
        .unwrap();
    assert!(users.has_relations(user.id().unwrap(), &["roles"]).await.unwrap());
    assert_eq!(role.get("name"), Some(&json!("admin")));

    let posts = repo(&store, "posts");
    let err = posts
        .create_relationally(&post, "author", attrs(json!({ "name": "x" })))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

async fn update_or_create_relationally_is_scoped_to_parent<S: Store>(store: S) {
    let users = repo(&store, "users");
    let posts = repo(&store, "posts");
    let alice = users.create(attrs(json!({ "name": "alice" }))).await.unwrap();
    let bob = users.create(attrs(json!({ "name": "bob" }))).await.unwrap();
    users
        .create_relationally(&bob, "posts", attrs(json!({ "title": "intro", "status": "draft" })))
        .await
        .unwrap();

    let created = users
        .update_or_create_relationally(
            &alice,
            "posts",
            attrs(json!({ "title": "intro" })),
            attrs(json!({ "status": "draft" })),
        )
        .await
        .unwrap();
    assert_eq!(created.get("user_id"), Some(&json!(1)));
    assert_eq!(posts.query().count().await.unwrap(), 2);

    let updated = users
        .update_or_create_relationally(
            &alice,
            "posts",
            attrs(json!({ "title": "intro" })),
            attrs(json!({ "status": "published" })),
        )
        .await
        .unwrap();
    assert_eq!(updated.id(), created.id());
    assert_eq!(updated.get("status"), Some(&json!("published")));

    let bobs = posts
        .get_where("user_id", json!(2), Vec::new(), Lookup::Required, None)
        .await
        .unwrap();
    assert_eq!(bobs[0].get("status"), Some(&json!("draft")));
}

// =============================================================================
// Runners
// =============================================================================

macro_rules! contract {
    ($($check:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $check() {
                    super::$check(super::memory_store()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $check() {
                    super::$check(super::sqlite_store().await).await;
                }
            )*
        }
    };
}

contract!(
    create_then_get_returns_given_attributes,
    delete_then_optional_get_is_missing,
    get_without_id_returns_everything,
    get_where_fails_only_when_required_and_empty,
    get_where_defaults_to_newest_first,
    get_where_in_is_membership,
    first_where_names_the_hint,
    paginate_reports_metadata,
    paginate_past_the_end_is_empty,
    chunk_visits_every_page_once,
    chunk_stops_cleanly_on_an_exact_multiple,
    id_filters_compare_by_json_type,
    query_handle_composes_filters,
    create_validates_required_and_unique,
    first_or_new_never_persists,
    update_or_create_keeps_one_identity,
    update_applies_only_fillable_fields,
    update_by_unknown_id_is_not_found,
    delete_respects_references,
    sync_makes_membership_exact,
    sync_rejects_unknown_ids_before_changing_anything,
    attach_and_detach_count_members,
    has_relations_is_an_or_across_relations,
    load_resolves_nested_relations,
    create_relationally_links_the_new_entity,
    update_or_create_relationally_is_scoped_to_parent,
);
