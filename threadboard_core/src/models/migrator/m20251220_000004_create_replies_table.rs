use sea_orm_migration::{prelude::*, schema::*};

use super::m20251220_000001_create_users_table::User;
use super::m20251220_000003_create_posts_table::Post;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reply::Table)
                    .col(pk_auto(Reply::Id))
                    .col(big_integer(Reply::PostId))
                    .col(big_integer_null(Reply::ParentId)) // For threaded replies
                    .col(big_integer(Reply::UserId))
                    .col(text(Reply::Body))
                    .col(timestamp_with_time_zone(Reply::CreatedAt))
                    .col(timestamp_with_time_zone(Reply::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reply-post_id")
                            .from(Reply::Table, Reply::PostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reply-parent_id")
                            .from(Reply::Table, Reply::ParentId)
                            .to(Reply::Table, Reply::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-reply-user_id")
                            .from(Reply::Table, Reply::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Whole-thread fetches filter on post_id
        manager
            .create_index(
                Index::create()
                    .name("idx_replies_post_id")
                    .table(Reply::Table)
                    .col(Reply::PostId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_replies_parent_id")
                    .table(Reply::Table)
                    .col(Reply::ParentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reply::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Reply {
    Table,
    Id,
    PostId,
    ParentId,
    UserId,
    Body,
    CreatedAt,
    UpdatedAt,
}
