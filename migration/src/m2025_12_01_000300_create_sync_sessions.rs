//! Migration to create the sync_sessions table.
//!
//! A sync session tracks one user-facing blocking sync operation: live
//! progress, item counters, and the terminal outcome.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncSessions::UserId).uuid().not_null())
                    .col(ColumnDef::new(SyncSessions::Service).text().not_null())
                    .col(
                        ColumnDef::new(SyncSessions::Status)
                            .text()
                            .not_null()
                            .default("started"),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CurrentStep)
                            .text()
                            .not_null()
                            .default("Starting sync"),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::ProgressPercentage)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::TotalItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::ImportedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::FailedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::Preferences)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::ErrorDetails)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_sessions_user_created")
                    .table(SyncSessions::Table)
                    .col(SyncSessions::UserId)
                    .col(SyncSessions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_sessions_user_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncSessions {
    Table,
    Id,
    UserId,
    Service,
    Status,
    CurrentStep,
    ProgressPercentage,
    TotalItems,
    ImportedItems,
    FailedItems,
    Preferences,
    ErrorDetails,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
