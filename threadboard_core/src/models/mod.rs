use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::config::BoardConfig;

pub mod migrator;

pub async fn open_or_create_db(config: &BoardConfig) -> Result<DatabaseConnection, DbErr> {
    // Use display() to convert PathBuf to string representation
    let connection_string = format!("sqlite://{}?mode=rwc", config.database_path.display());

    let mut options = ConnectOptions::new(connection_string);
    options.sqlx_logging(false);

    tracing::info!(path = %config.database_path.display(), "opening board database");
    Database::connect(options).await
}

pub async fn migrate_up(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrator::Migrator::up(db, None).await
}
