//! # Error Record Repository
//!
//! Repository operations for the error_records table. Callers that must
//! never propagate failures (the error tracker) wrap these in their own
//! degrade-to-default layer; the repository itself reports `DbErr` honestly.

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::errors::{ErrorProvider, ErrorStage};
use crate::models::error_record::{ActiveModel, Column, Entity, Model};

/// Filters for the error summary listing.
#[derive(Debug, Clone, Default)]
pub struct ErrorSummaryFilter {
    pub include_resolved: bool,
    pub since: Option<DateTime<Utc>>,
    pub provider: Option<ErrorProvider>,
    pub stage: Option<ErrorStage>,
}

/// Repository for error record database operations
#[derive(Clone)]
pub struct ErrorRecordRepository {
    db: DatabaseConnection,
}

impl ErrorRecordRepository {
    /// Create a new ErrorRecordRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new classified error record and return it.
    pub async fn insert(
        &self,
        user_id: Uuid,
        raw_event_id: Option<Uuid>,
        provider: ErrorProvider,
        stage: ErrorStage,
        error: &str,
        context: Option<JsonValue>,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let record = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            raw_event_id: Set(raw_event_id),
            provider: Set(provider.as_str().to_string()),
            stage: Set(stage.as_str().to_string()),
            error: Set(error.to_string()),
            context: Set(context),
            retry_count: Set(0),
            last_retry_at: Set(None),
            resolved_at: Set(None),
            user_acknowledged: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        record.insert(&self.db).await
    }

    /// Fetch a record by id for the user.
    pub async fn find_owned(
        &self,
        user_id: Uuid,
        record_id: Uuid,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(record_id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
    }

    /// List records for the summary view, newest first. Resolved and
    /// acknowledged records are hidden unless `include_resolved` is set.
    pub async fn list_for_summary(
        &self,
        user_id: Uuid,
        filter: &ErrorSummaryFilter,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find().filter(Column::UserId.eq(user_id));

        if !filter.include_resolved {
            query = query
                .filter(Column::ResolvedAt.is_null())
                .filter(Column::UserAcknowledged.eq(false));
        }
        if let Some(since) = filter.since {
            query = query.filter(Column::CreatedAt.gte(since.fixed_offset()));
        }
        if let Some(provider) = filter.provider {
            query = query.filter(Column::Provider.eq(provider.as_str()));
        }
        if let Some(stage) = filter.stage {
            query = query.filter(Column::Stage.eq(stage.as_str()));
        }

        query
            .order_by_desc(Column::CreatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }

    /// Mark a record as acknowledged by the user. Returns `false` when the
    /// record does not exist or belongs to another user.
    pub async fn set_acknowledged(&self, user_id: Uuid, record_id: Uuid) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::UserAcknowledged, Expr::value(true))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(record_id))
            .filter(Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Mark a record as resolved, stamping `resolved_at` once. Already
    /// resolved records are left untouched and report `false`.
    pub async fn set_resolved(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        context: Option<JsonValue>,
    ) -> Result<bool, DbErr> {
        let now = Utc::now().fixed_offset();
        let mut update = Entity::update_many()
            .col_expr(Column::ResolvedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(record_id))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ResolvedAt.is_null());

        if let Some(context) = context {
            update = update.col_expr(Column::Context, Expr::value(Some(context)));
        }

        let result = update.exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    /// Record one retry attempt: bumps `retry_count`, stamps `last_retry_at`,
    /// and on success also resolves the record. Returns the updated record.
    pub async fn record_retry(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        success: bool,
        context: Option<JsonValue>,
    ) -> Result<Option<Model>, DbErr> {
        let Some(record) = self.find_owned(user_id, record_id).await? else {
            return Ok(None);
        };

        let now = Utc::now().fixed_offset();
        let next_retry_count = record.retry_count + 1;
        let mut active: ActiveModel = record.into();
        active.retry_count = Set(next_retry_count);
        active.last_retry_at = Set(Some(now));
        if success {
            active.resolved_at = Set(Some(now));
        }
        if let Some(context) = context {
            active.context = Set(Some(context));
        }
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    /// Candidate records for automated retry: unresolved, unacknowledged,
    /// under the retry cap, and past the minimum retry interval. Callers
    /// still filter on the classification in the context blob.
    pub async fn retry_candidates(
        &self,
        user_id: Uuid,
        max_retry_count: i32,
        retried_before: DateTime<Utc>,
        provider: Option<ErrorProvider>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ResolvedAt.is_null())
            .filter(Column::UserAcknowledged.eq(false))
            .filter(Column::RetryCount.lt(max_retry_count))
            .filter(
                Condition::any()
                    .add(Column::LastRetryAt.is_null())
                    .add(Column::LastRetryAt.lte(retried_before.fixed_offset())),
            );

        if let Some(provider) = provider {
            query = query.filter(Column::Provider.eq(provider.as_str()));
        }

        query
            .order_by_asc(Column::CreatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }

    /// Delete resolved or acknowledged records created before `cutoff`.
    /// Returns the number of rows removed.
    pub async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::CreatedAt.lt(cutoff.fixed_offset()))
            .filter(
                Condition::any()
                    .add(Column::ResolvedAt.is_not_null())
                    .add(Column::UserAcknowledged.eq(true)),
            )
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
