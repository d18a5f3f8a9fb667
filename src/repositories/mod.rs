//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access
//! with user-scoped methods.

pub mod error_record;
pub mod job;
pub mod sync_session;

pub use error_record::{ErrorRecordRepository, ErrorSummaryFilter};
pub use job::JobRepository;
pub use sync_session::{CounterUpdate, SessionCounters, SyncSessionRepository};
