//! Job entity model
//!
//! This module contains the SeaORM entity model for the jobs table, which
//! represents user-scoped asynchronous units of work (normalize, embed,
//! insight, provider sync) tracked through the queue lifecycle.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Job entity representing one asynchronous unit of work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Groups jobs spawned by one sync/operation; immutable once set
    pub batch_id: Uuid,

    /// Kind of work (e.g., normalize, embed, insight, sync_gmail)
    pub kind: String,

    /// Current status (queued, processing, completed, failed, retrying)
    pub status: String,

    /// Number of execution attempts; never decreases
    pub attempts: i32,

    /// Kind-specific payload (e.g., chunk counters for sync jobs)
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Message from the most recent failed attempt
    pub last_error: Option<String>,

    /// Timestamp when the job was created; dequeue order basis
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last mutation; stuck/age calculation basis
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
