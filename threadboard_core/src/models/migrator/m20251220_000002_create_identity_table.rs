use sea_orm_migration::{prelude::*, schema::*};

use super::m20251220_000001_create_users_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    // Binds an iroh node key to the user it authenticates as.
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Identity::Table)
                    .col(binary(Identity::NodeId))
                    .col(big_integer(Identity::UserId))
                    .index(Index::create().primary().col(Identity::NodeId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-identity-user_id")
                            .from(Identity::Table, Identity::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Identity::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Identity {
    Table,
    NodeId,
    UserId,
}
