//! # Wellsync Jobs API Main Entry Point
//!
//! This is the main entry point for the Wellsync jobs service.

use migration::MigratorTrait;
use wellsync::{
    config::ConfigLoader,
    db::init_pool,
    server::{Collaborators, run_server},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    migration::Migrator::up(&db, None).await?;

    // Local wiring; deployments register real handlers and providers here.
    run_server(config, db, Collaborators::default()).await
}
