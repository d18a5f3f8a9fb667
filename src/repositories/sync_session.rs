//! # Sync Session Repository
//!
//! Repository operations for the sync_sessions table. Progress percentages
//! are clamped to 0-100 and never move backwards; terminal updates stamp
//! `completed_at` exactly once.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::sync_session::{ActiveModel, Column, Entity, Model};

/// Final item counters stamped when a session completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounters {
    pub total_items: i32,
    pub imported_items: i32,
    pub failed_items: i32,
}

/// Counter values carried by a live progress update. An omitted counter
/// keeps the session's stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterUpdate {
    pub total_items: Option<i32>,
    pub imported_items: Option<i32>,
    pub failed_items: Option<i32>,
}

impl From<SessionCounters> for CounterUpdate {
    fn from(counters: SessionCounters) -> Self {
        Self {
            total_items: Some(counters.total_items),
            imported_items: Some(counters.imported_items),
            failed_items: Some(counters.failed_items),
        }
    }
}

/// Repository for sync session database operations
#[derive(Clone)]
pub struct SyncSessionRepository {
    db: DatabaseConnection,
}

impl SyncSessionRepository {
    /// Create a new SyncSessionRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new session in `started` at 0%.
    pub async fn create(
        &self,
        user_id: Uuid,
        service: &str,
        preferences: JsonValue,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let session = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            service: Set(service.to_string()),
            status: Set("started".to_string()),
            current_step: Set("Starting sync".to_string()),
            progress_percentage: Set(0),
            total_items: Set(0),
            imported_items: Set(0),
            failed_items: Set(0),
            preferences: Set(preferences),
            error_details: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        session.insert(&self.db).await
    }

    /// Apply a live progress update. The stored percentage only moves
    /// forward; a lower incoming value keeps the current one, and an
    /// omitted counter keeps its stored value. Completed sessions are left
    /// untouched.
    pub async fn update_progress(
        &self,
        session_id: Uuid,
        status: &str,
        step: &str,
        percentage: i32,
        counters: CounterUpdate,
    ) -> Result<Option<Model>, DbErr> {
        let Some(session) = Entity::find_by_id(session_id).one(&self.db).await? else {
            return Ok(None);
        };
        if session.completed_at.is_some() {
            return Ok(Some(session));
        }

        let next_percentage = percentage.clamp(0, 100).max(session.progress_percentage);
        let next_total = counters.total_items.unwrap_or(session.total_items);
        let next_imported = counters.imported_items.unwrap_or(session.imported_items);
        let next_failed = counters.failed_items.unwrap_or(session.failed_items);

        let mut active: ActiveModel = session.into();
        active.status = Set(status.to_string());
        active.current_step = Set(step.to_string());
        active.progress_percentage = Set(next_percentage);
        active.total_items = Set(next_total);
        active.imported_items = Set(next_imported);
        active.failed_items = Set(next_failed);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(Some(active.update(&self.db).await?))
    }

    /// Terminal success: `completed` at 100% with final counters.
    pub async fn complete(
        &self,
        session_id: Uuid,
        step: &str,
        counters: SessionCounters,
    ) -> Result<Option<Model>, DbErr> {
        let Some(session) = Entity::find_by_id(session_id).one(&self.db).await? else {
            return Ok(None);
        };
        if session.completed_at.is_some() {
            return Ok(Some(session));
        }

        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = session.into();
        active.status = Set("completed".to_string());
        active.current_step = Set(step.to_string());
        active.progress_percentage = Set(100);
        active.total_items = Set(counters.total_items);
        active.imported_items = Set(counters.imported_items);
        active.failed_items = Set(counters.failed_items);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    /// Terminal failure: `failed` with `{error, timestamp}` details. The
    /// progress percentage is left where it was.
    pub async fn fail(&self, session_id: Uuid, error: &str) -> Result<Option<Model>, DbErr> {
        let Some(session) = Entity::find_by_id(session_id).one(&self.db).await? else {
            return Ok(None);
        };
        if session.completed_at.is_some() {
            return Ok(Some(session));
        }

        let now = Utc::now().fixed_offset();
        let details = serde_json::json!({
            "error": error,
            "timestamp": now.to_utc().to_rfc3339(),
        });

        let mut active: ActiveModel = session.into();
        active.status = Set("failed".to_string());
        active.current_step = Set("Sync failed".to_string());
        active.error_details = Set(Some(details));
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    /// Fetch a session by id for the user.
    pub async fn find_owned(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(session_id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
    }

    /// Most recent sessions for a user, newest first.
    pub async fn recent_for_user(&self, user_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::json;

    async fn setup() -> SyncSessionRepository {
        let db = Database::connect("sqlite::memory:").await.expect("db");
        Migrator::up(&db, None).await.expect("migrations");
        SyncSessionRepository::new(db)
    }

    #[tokio::test]
    async fn test_step_only_update_keeps_counters() {
        let sessions = setup().await;
        let session = sessions
            .create(Uuid::new_v4(), "gmail", json!({}))
            .await
            .unwrap();

        sessions
            .update_progress(
                session.id,
                "importing",
                "Importing messages",
                40,
                CounterUpdate {
                    total_items: Some(12),
                    imported_items: Some(4),
                    failed_items: Some(1),
                },
            )
            .await
            .unwrap();

        // A step-only update carries no counters; the stored ones survive.
        let updated = sessions
            .update_progress(
                session.id,
                "importing",
                "Resolving attachments",
                55,
                CounterUpdate::default(),
            )
            .await
            .unwrap()
            .expect("session exists");

        assert_eq!(updated.current_step, "Resolving attachments");
        assert_eq!(updated.progress_percentage, 55);
        assert_eq!(updated.total_items, 12);
        assert_eq!(updated.imported_items, 4);
        assert_eq!(updated.failed_items, 1);
    }

    #[tokio::test]
    async fn test_completed_session_ignores_updates() {
        let sessions = setup().await;
        let session = sessions
            .create(Uuid::new_v4(), "calendar", json!({}))
            .await
            .unwrap();

        sessions
            .complete(session.id, "Sync complete", SessionCounters::default())
            .await
            .unwrap();

        let after = sessions
            .update_progress(session.id, "importing", "Late update", 10, CounterUpdate::default())
            .await
            .unwrap()
            .expect("session exists");

        assert_eq!(after.status, "completed");
        assert_eq!(after.progress_percentage, 100);
    }
}
