use sea_orm::ConnectOptions;
use sea_orm_migration::MigratorTrait;

use crate::{
    entity::prelude::*,
    ids::{PostId, UserId},
    models::migrator::Migrator,
};

/// Create a fresh, migrated in-memory SQLite database.
///
/// The pool is capped at one connection: every connection to `sqlite::memory:`
/// opens its own private database, so a second one would see no tables.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> UserId {
    let user = UserActiveModel {
        id: NotSet,
        name: Set(format!("{username} display")),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        created_at: Set(chrono::Utc::now()),
    };
    User::insert(user)
        .exec(db)
        .await
        .expect("Failed to insert user")
        .last_insert_id
}

pub async fn create_test_post(db: &DatabaseConnection, user_id: UserId, title: &str) -> PostId {
    let now = chrono::Utc::now();
    let post = PostActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        title: Set(title.to_string()),
        content: Set(format!("{title} content")),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Post::insert(post)
        .exec(db)
        .await
        .expect("Failed to insert post")
        .last_insert_id
}
