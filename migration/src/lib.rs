//! Database migrations for the Wellsync jobs service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_000100_create_jobs;
mod m2025_12_01_000200_create_error_records;
mod m2025_12_01_000300_create_sync_sessions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_000100_create_jobs::Migration),
            Box::new(m2025_12_01_000200_create_error_records::Migration),
            Box::new(m2025_12_01_000300_create_sync_sessions::Migration),
        ]
    }
}
