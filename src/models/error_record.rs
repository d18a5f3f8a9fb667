//! ErrorRecord entity model
//!
//! SeaORM entity for the error_records table: classified sync/processing
//! failures with retry and acknowledgement lifecycle markers. The
//! classification and correlation metadata live in a versioned `context`
//! blob; markers the retry queries filter on are real columns.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// ErrorRecord entity representing one classified failure
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "error_records")]
pub struct Model {
    /// Unique identifier for the error record (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Raw ingested item this failure relates to, if any
    pub raw_event_id: Option<Uuid>,

    /// Provider the failure originated from (gmail, calendar, drive)
    pub provider: String,

    /// Pipeline stage (ingestion, normalization, processing)
    pub stage: String,

    /// Error message
    pub error: String,

    /// Versioned context blob: classification plus correlation metadata.
    /// Null until the record has been classified ("enhanced").
    #[sea_orm(column_type = "JsonBinary")]
    pub context: Option<JsonValue>,

    /// Number of retry attempts recorded; only increases
    pub retry_count: i32,

    /// Timestamp of the most recent retry attempt
    pub last_retry_at: Option<DateTimeWithTimeZone>,

    /// Set once when the failure is resolved; terminal marker
    pub resolved_at: Option<DateTimeWithTimeZone>,

    /// Whether the user dismissed the failure; independent terminal marker
    pub user_acknowledged: bool,

    /// Timestamp when the record was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last mutation
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
