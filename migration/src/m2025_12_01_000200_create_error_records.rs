//! Migration to create the error_records table.
//!
//! Error records capture classified sync/processing failures with retry and
//! acknowledgement lifecycle markers. Classification details live in the
//! versioned `context` JSON blob; markers that the retry queries filter on
//! are promoted to real columns.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ErrorRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ErrorRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ErrorRecords::UserId).uuid().not_null())
                    .col(ColumnDef::new(ErrorRecords::RawEventId).uuid().null())
                    .col(ColumnDef::new(ErrorRecords::Provider).text().not_null())
                    .col(ColumnDef::new(ErrorRecords::Stage).text().not_null())
                    .col(ColumnDef::new(ErrorRecords::Error).text().not_null())
                    .col(ColumnDef::new(ErrorRecords::Context).json_binary().null())
                    .col(
                        ColumnDef::new(ErrorRecords::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::LastRetryAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::UserAcknowledged)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Pending/summary views filter by user and terminal markers
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_error_records_user_created ON error_records (user_id, created_at DESC)"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_error_records_user_resolved")
                    .table(ErrorRecords::Table)
                    .col(ErrorRecords::UserId)
                    .col(ErrorRecords::ResolvedAt)
                    .col(ErrorRecords::UserAcknowledged)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_error_records_user_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_error_records_user_resolved")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ErrorRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ErrorRecords {
    Table,
    Id,
    UserId,
    RawEventId,
    Provider,
    Stage,
    Error,
    Context,
    RetryCount,
    LastRetryAt,
    ResolvedAt,
    UserAcknowledged,
    CreatedAt,
    UpdatedAt,
}
