//! # Seed Data Generator
//!
//! Populates a database with a small demo schema for development.
//!
//! ## Usage
//! ```bash
//! # 50 users (default)
//! cargo run -p quarry-db --features seed --bin seed
//!
//! # Custom amount
//! cargo run -p quarry-db --features seed --bin seed -- --count 500
//!
//! # Specify database path
//! cargo run -p quarry-db --features seed --bin seed -- --db ./data/quarry.db
//! ```
//!
//! ## Demo Schema
//! - `users`: name, email (unique); has many `posts`, belongs to many `roles`
//! - `posts`: title, body; belongs to `author`
//! - `roles`: name (unique); belongs to many `users`
//!
//! Every user gets one to three posts and one or two roles.

use std::env;
use std::ops::ControlFlow;

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use quarry_core::{
    Attributes, EntityId, EntityKind, PivotTable, RelationDescriptor, Schema, DEFAULT_PER_PAGE,
};
use quarry_db::{Database, DbConfig, EntityRepository, Lookup, Repository};

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Linus", "Barbara", "Ken", "Margaret", "Dennis", "Frances", "Edsger", "Radia",
];

const ROLES: &[&str] = &["admin", "editor", "author", "reviewer"];

const TOPICS: &[&str] = &[
    "Indexes", "Pivot tables", "Eager loading", "Pagination", "Transactions", "Migrations",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./quarry_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Quarry Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of users to generate (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./quarry_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Quarry Seed Data Generator");
    println!("==========================");
    println!("Database: {}", db_path);
    println!("Users:    {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let store = db.store(demo_schema()?);

    let users = EntityRepository::new(store.clone(), "users")?;
    let posts = EntityRepository::new(store.clone(), "posts")?;
    let roles = EntityRepository::new(store, "roles")?;

    let existing = users.query().count().await?;
    if existing > 0 {
        println!("Database already has {} users", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut role_ids: Vec<EntityId> = Vec::with_capacity(ROLES.len());
    for name in ROLES {
        let role = roles
            .first_or_create(attributes(json!({ "name": name })), Attributes::new())
            .await?;
        role_ids.extend(role.id());
    }

    let start = std::time::Instant::now();
    let mut post_count = 0;

    for n in 0..count {
        let first = FIRST_NAMES[n % FIRST_NAMES.len()];
        let user = users
            .create(attributes(json!({
                "name": format!("{} {}", first, n),
                "email": format!("{}.{}@example.test", first.to_lowercase(), n),
            })))
            .await?;

        for p in 0..(1 + n % 3) {
            let topic = TOPICS[(n + p) % TOPICS.len()];
            users
                .create_relationally(
                    &user,
                    "posts",
                    attributes(json!({
                        "title": format!("Notes on {}", topic),
                        "body": format!("Part {} of what {} learned about {}.", p + 1, first, topic),
                    })),
                )
                .await?;
            post_count += 1;
        }

        let picks = [role_ids[n % role_ids.len()], role_ids[(n * 7 + 1) % role_ids.len()]];
        users.attach(&user, "roles", &picks, Attributes::new(), false).await?;
    }

    let elapsed = start.elapsed();
    println!("Generated {} users and {} posts in {:?}", count, post_count, elapsed);

    println!();
    println!("Verifying...");

    let mut seen = 0;
    users
        .chunk(DEFAULT_PER_PAGE, |page, _| {
            seen += page.len();
            ControlFlow::Continue(())
        })
        .await?;
    println!("  Chunked users: {}", seen);

    let admins = roles
        .first_where("name", Value::from("admin"), Vec::new(), Lookup::Required, Some("role"))
        .await?;
    if let Some(mut admin) = admins {
        roles.load(&mut admin, &["users.posts"]).await?;
        let members = admin.relation("users").map(|r| r.entities().len()).unwrap_or(0);
        println!("  Admins: {}", members);
    }

    let latest = posts.paginate(5).await?;
    println!("  Posts total: {} ({} pages of 5)", latest.total, latest.last_page());

    println!();
    println!("Seed complete!");

    Ok(())
}

fn demo_schema() -> Result<Schema, quarry_core::CoreError> {
    Schema::builder()
        .kind(
            EntityKind::new("users")
                .fillable(["name", "email"])
                .required(["name", "email"])
                .unique(["email"])
                .relation(RelationDescriptor::has_many("posts", "posts", "user_id"))
                .relation(RelationDescriptor::belongs_to_many(
                    "roles",
                    "roles",
                    PivotTable::new("role_user", "user_id", "role_id").with_timestamps(),
                )),
        )
        .kind(
            EntityKind::new("posts")
                .fillable(["title", "body"])
                .required(["title"])
                .relation(RelationDescriptor::belongs_to("author", "users", "user_id")),
        )
        .kind(
            EntityKind::new("roles")
                .fillable(["name"])
                .unique(["name"])
                .relation(RelationDescriptor::belongs_to_many(
                    "users",
                    "users",
                    PivotTable::new("role_user", "role_id", "user_id").with_timestamps(),
                )),
        )
        .build()
}

fn attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// `RUST_LOG=debug` shows every repository call; the default is quiet.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,quarry_db=info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}
