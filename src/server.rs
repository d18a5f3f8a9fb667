//! # Server Configuration
//!
//! This module contains the server setup and wiring for the Wellsync jobs
//! API: application state, router construction, and the OpenAPI document.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::errors::tracker::ErrorTracker;
use crate::errors::{DefaultClassifier, ErrorClassifier};
use crate::handlers;
use crate::jobs::runner::JobRunner;
use crate::jobs::status::{FreshnessSource, JobStatusAggregator, JobStatusReport};
use crate::jobs::HandlerRegistry;
use crate::repositories::{ErrorRecordRepository, JobRepository, SyncSessionRepository};
use crate::sync::stub::{EmptyFreshness, OpenDirectory, StubProvider};
use crate::sync::{IntegrationDirectory, ProviderSync, SyncOrchestrator};
use crate::telemetry::{self, TraceContext};

/// Injected collaborators: the pieces of the system that live outside this
/// core (provider clients, integration lookup, classification, handlers).
pub struct Collaborators {
    pub registry: HandlerRegistry,
    pub classifier: Arc<dyn ErrorClassifier>,
    pub provider: Arc<dyn ProviderSync>,
    pub integrations: Arc<dyn IntegrationDirectory>,
    pub freshness: Arc<dyn FreshnessSource>,
}

impl Default for Collaborators {
    /// Local-development wiring: stub provider, open directory, default
    /// message classifier, no registered job handlers.
    fn default() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            classifier: Arc::new(DefaultClassifier),
            provider: Arc::new(StubProvider),
            integrations: Arc::new(OpenDirectory),
            freshness: Arc::new(EmptyFreshness),
        }
    }
}

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub runner: JobRunner,
    pub aggregator: JobStatusAggregator,
    pub tracker: ErrorTracker,
    pub orchestrator: SyncOrchestrator,
    pub status_cache: Arc<TtlCache<Uuid, JobStatusReport>>,
}

impl AppState {
    /// Wire the full component graph over one database connection.
    pub fn new(db: DatabaseConnection, config: AppConfig, collaborators: Collaborators) -> Self {
        let jobs = JobRepository::new(db.clone());
        let sessions = SyncSessionRepository::new(db.clone());
        let errors = ErrorRecordRepository::new(db.clone());

        let tracker = ErrorTracker::new(
            errors,
            collaborators.classifier,
            config.errors.clone(),
        );
        let runner = JobRunner::new(
            jobs.clone(),
            Arc::new(collaborators.registry),
            tracker.clone(),
            config.jobs.clone(),
        );
        let aggregator = JobStatusAggregator::new(
            jobs.clone(),
            collaborators.freshness,
            config.jobs.clone(),
        );
        let orchestrator = SyncOrchestrator::new(
            sessions,
            jobs,
            runner.clone(),
            tracker.clone(),
            collaborators.integrations,
            collaborators.provider,
            config.sync.clone(),
            config.jobs.clone(),
        );
        let status_cache = Arc::new(TtlCache::new(
            config.status_cache.capacity,
            Duration::from_secs(config.status_cache.ttl_seconds),
        ));

        Self {
            db,
            config,
            runner,
            aggregator,
            tracker,
            orchestrator,
            status_cache,
        }
    }

    /// Drop the cached status report for a user after a mutation.
    pub fn invalidate_status_cache(&self, user_id: Uuid) {
        self.status_cache.invalidate(&user_id);
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/users/{user_id}/sync/{service}",
            post(handlers::sync::blocking_sync),
        )
        .route(
            "/users/{user_id}/jobs/process",
            post(handlers::jobs::process_jobs),
        )
        .route(
            "/users/{user_id}/jobs/status",
            get(handlers::jobs::job_status),
        )
        .route(
            "/users/{user_id}/errors/summary",
            get(handlers::errors::error_summary),
        )
        .route(
            "/users/{user_id}/errors/retryable",
            get(handlers::errors::retryable_errors),
        )
        .route(
            "/users/{user_id}/errors/{error_id}/acknowledge",
            post(handlers::errors::acknowledge_error),
        )
        .route(
            "/users/{user_id}/errors/{error_id}/resolve",
            post(handlers::errors::resolve_error),
        )
        .route(
            "/users/{user_id}/errors/{error_id}/retry",
            post(handlers::errors::record_retry),
        )
        .route("/admin/errors/cleanup", post(handlers::errors::cleanup_errors))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Establish a per-request trace ID (from `x-request-id` when the caller
/// supplies one) and echo it back on the response.
async fn trace_context_middleware(request: Request<Body>, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    let mut response = telemetry::with_trace_context(context, next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    collaborators: Collaborators,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::new(db, config, collaborators);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::sync::blocking_sync,
        crate::handlers::jobs::process_jobs,
        crate::handlers::jobs::job_status,
        crate::handlers::errors::error_summary,
        crate::handlers::errors::retryable_errors,
        crate::handlers::errors::acknowledge_error,
        crate::handlers::errors::resolve_error,
        crate::handlers::errors::record_retry,
        crate::handlers::errors::cleanup_errors,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::jobs::runner::ProcessOutcome,
            crate::jobs::status::JobStatusReport,
            crate::jobs::status::QueueStatus,
            crate::jobs::status::JobView,
            crate::jobs::status::DataFreshness,
            crate::jobs::status::EstimatedCompletion,
            crate::jobs::status::StuckJobView,
            crate::jobs::status::QueueHealth,
            crate::errors::tracker::ErrorSummary,
            crate::errors::tracker::ErrorSummaryEntry,
            crate::handlers::errors::ErrorUpdateResponse,
            crate::handlers::errors::CleanupResponse,
            crate::handlers::errors::RetryableResponse,
            crate::handlers::errors::ResolveRequest,
            crate::handlers::errors::RetryAttemptRequest,
            crate::sync::SyncOptions,
            crate::sync::SyncWindow,
            crate::sync::orchestrator::BlockingSyncResult,
            crate::sync::orchestrator::SyncStats,
        )
    ),
    info(
        title = "Wellsync Jobs API",
        description = "Background job lifecycle and sync orchestration",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
