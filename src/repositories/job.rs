//! # Job Repository
//!
//! Repository operations for the jobs table: idempotent enqueue, atomic
//! claim for the runner, status transitions, and the read queries the
//! status aggregator is built on. All operations are user-scoped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::jobs::{JobKind, JobStatus};
use crate::models::job::{ActiveModel, Column, Entity, Model};

/// Repository for job database operations
#[derive(Clone)]
pub struct JobRepository {
    db: DatabaseConnection,
}

impl JobRepository {
    /// Create a new JobRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a new job, idempotent per (user, kind, batch): while a
    /// non-terminal job with the same triple exists, its id is returned
    /// instead of inserting a duplicate.
    pub async fn enqueue(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        kind: &JobKind,
        payload: JsonValue,
    ) -> Result<Uuid, DbErr> {
        let existing = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::BatchId.eq(batch_id))
            .filter(Column::Kind.eq(kind.as_str()))
            .filter(Column::Status.is_in(pending_status_strings()))
            .one(&self.db)
            .await?;

        if let Some(job) = existing {
            tracing::debug!(
                user_id = %user_id,
                batch_id = %batch_id,
                kind = %kind,
                job_id = %job.id,
                "Enqueue deduplicated onto existing pending job"
            );
            return Ok(job.id);
        }

        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            batch_id: Set(batch_id),
            kind: Set(kind.as_str().to_string()),
            status: Set(JobStatus::Queued.as_str().to_string()),
            attempts: Set(0),
            payload: Set(payload),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = job.insert(&self.db).await?;

        tracing::info!(
            user_id = %user_id,
            batch_id = %batch_id,
            kind = %kind,
            job_id = %inserted.id,
            "Job enqueued"
        );

        Ok(inserted.id)
    }

    /// Claim up to `limit` dequeue-eligible jobs for a user in FIFO order.
    ///
    /// Each claim is a conditional UPDATE (`queued|retrying → processing`,
    /// attempts += 1); a job already claimed by a concurrent invocation
    /// affects zero rows and is skipped, so no job is double-processed.
    pub async fn claim_eligible(&self, user_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        let candidate_ids: Vec<Uuid> = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.is_in(dequeue_status_strings()))
            .order_by_asc(Column::CreatedAt)
            .limit(Some(limit))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        let now = Utc::now().fixed_offset();

        for job_id in candidate_ids {
            let result = Entity::update_many()
                .col_expr(
                    Column::Status,
                    Expr::value(JobStatus::Processing.as_str()),
                )
                .col_expr(
                    Column::Attempts,
                    Expr::value(Expr::col(Column::Attempts).add(1)),
                )
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.eq(job_id))
                .filter(Column::Status.is_in(dequeue_status_strings()))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 1
                && let Some(job) = Entity::find_by_id(job_id).one(&self.db).await?
            {
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    /// Mark a processing job as completed.
    pub async fn mark_completed(&self, job: &Model) -> Result<(), DbErr> {
        let mut active: ActiveModel = job.clone().into();
        active.status = Set(JobStatus::Completed.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Mark a processing job as failed, recording the error message.
    pub async fn mark_failed(&self, job: &Model, error: &str) -> Result<(), DbErr> {
        let mut active: ActiveModel = job.clone().into();
        active.status = Set(JobStatus::Failed.as_str().to_string());
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Move a failed job back to `retrying` (explicit operator decision).
    /// Returns `false` when the job does not exist, does not belong to the
    /// user, or is not in `failed`.
    pub async fn mark_retrying(&self, user_id: Uuid, job_id: Uuid) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Retrying.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(job_id))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(JobStatus::Failed.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Per-status job counts for a user, optionally scoped to one batch.
    pub async fn status_counts(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, DbErr> {
        let mut query = Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .filter(Column::UserId.eq(user_id));

        if let Some(batch) = batch_id {
            query = query.filter(Column::BatchId.eq(batch));
        }

        let rows: Vec<(String, i64)> = query
            .group_by(Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, count.max(0) as u64))
            .collect())
    }

    /// Per-kind job counts for a user, optionally scoped to one batch.
    pub async fn kind_counts(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, DbErr> {
        let mut query = Entity::find()
            .select_only()
            .column(Column::Kind)
            .column_as(Column::Id.count(), "count")
            .filter(Column::UserId.eq(user_id));

        if let Some(batch) = batch_id {
            query = query.filter(Column::BatchId.eq(batch));
        }

        let rows: Vec<(String, i64)> = query
            .group_by(Column::Kind)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(kind, count)| (kind, count.max(0) as u64))
            .collect())
    }

    /// Pending jobs (queued/processing/retrying) in FIFO order.
    pub async fn pending_jobs(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.is_in(pending_status_strings()));

        if let Some(batch) = batch_id {
            query = query.filter(Column::BatchId.eq(batch));
        }

        query
            .order_by_asc(Column::CreatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }

    /// Pending counts per kind, optionally scoped to one batch and
    /// restricted to the given kinds.
    pub async fn pending_kind_counts(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        kinds: Option<&[JobKind]>,
    ) -> Result<BTreeMap<String, u64>, DbErr> {
        let mut query = Entity::find()
            .select_only()
            .column(Column::Kind)
            .column_as(Column::Id.count(), "count")
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.is_in(pending_status_strings()));

        if let Some(batch) = batch_id {
            query = query.filter(Column::BatchId.eq(batch));
        }
        if let Some(kinds) = kinds {
            let kind_strings: Vec<String> =
                kinds.iter().map(|k| k.as_str().to_string()).collect();
            query = query.filter(Column::Kind.is_in(kind_strings));
        }

        let rows: Vec<(String, i64)> = query
            .group_by(Column::Kind)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(kind, count)| (kind, count.max(0) as u64))
            .collect())
    }

    /// Jobs sitting in `processing` with no update since `stale_before`.
    pub async fn stuck_jobs(
        &self,
        user_id: Uuid,
        stale_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(Column::UpdatedAt.lt(stale_before.fixed_offset()))
            .order_by_asc(Column::UpdatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }

    /// The most recently created jobs, newest first.
    pub async fn recent_jobs(&self, user_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }

    /// Timestamp of the most recently completed job, if any.
    pub async fn last_completed_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DbErr> {
        let job = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(JobStatus::Completed.as_str()))
            .order_by_desc(Column::UpdatedAt)
            .one(&self.db)
            .await?;

        Ok(job.map(|j| j.updated_at.to_utc()))
    }

    /// Fetch a job by id for the user.
    pub async fn find_owned(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(job_id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
    }
}

fn pending_status_strings() -> Vec<&'static str> {
    JobStatus::ALL
        .iter()
        .filter(|s| s.is_pending())
        .map(|s| s.as_str())
        .collect()
}

fn dequeue_status_strings() -> Vec<&'static str> {
    JobStatus::ALL
        .iter()
        .filter(|s| s.is_dequeue_eligible())
        .map(|s| s.as_str())
        .collect()
}
