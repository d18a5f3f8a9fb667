//! SyncSession entity model
//!
//! SeaORM entity for the sync_sessions table, tracking one user-facing
//! blocking sync operation: live progress, item counters, and outcome.
//! A session becomes immutable once `completed_at` is set.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// SyncSession entity representing one blocking sync run
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_sessions")]
pub struct Model {
    /// Unique identifier for the session (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Service being synced (gmail, calendar, drive)
    pub service: String,

    /// Current status (started, importing, processing, completed, failed)
    pub status: String,

    /// Human-readable label for the current step
    pub current_step: String,

    /// 0-100; monotonically non-decreasing within a session
    pub progress_percentage: i32,

    /// Total items reported by the provider
    pub total_items: i32,

    /// Items imported so far
    pub imported_items: i32,

    /// Items that failed to import
    pub failed_items: i32,

    /// Snapshot of the sync configuration used for this run
    #[sea_orm(column_type = "JsonBinary")]
    pub preferences: JsonValue,

    /// Set only on failure: {error, timestamp}
    #[sea_orm(column_type = "JsonBinary")]
    pub error_details: Option<JsonValue>,

    /// Set exactly once, on terminal success or failure
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the session was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last progress update
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
