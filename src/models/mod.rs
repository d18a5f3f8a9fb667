//! # Data Models
//!
//! This module contains all the data models used throughout the Wellsync
//! jobs service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod error_record;
pub mod job;
pub mod sync_session;

pub use error_record::Entity as ErrorRecord;
pub use job::Entity as Job;
pub use sync_session::Entity as SyncSession;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "wellsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
