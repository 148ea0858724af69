use sea_orm_migration::prelude::*;

mod m20251220_000001_create_users_table;
mod m20251220_000002_create_identity_table;
mod m20251220_000003_create_posts_table;
mod m20251220_000004_create_replies_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251220_000001_create_users_table::Migration),
            Box::new(m20251220_000002_create_identity_table::Migration),
            Box::new(m20251220_000003_create_posts_table::Migration),
            Box::new(m20251220_000004_create_replies_table::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{ConnectOptions, Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    assert!(schema_manager.has_table("user").await?);
    assert!(schema_manager.has_table("identity").await?);
    assert!(schema_manager.has_table("post").await?);
    assert!(schema_manager.has_table("reply").await?);

    Ok(())
}
