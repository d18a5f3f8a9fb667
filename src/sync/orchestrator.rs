//! # Sync Orchestrator
//!
//! Drives one blocking sync end to end: session creation, provider sync
//! with live progress, inline normalization via the job runner, and session
//! finalization. The caller gets a single synchronous round trip; the
//! session row is the durable record of what happened.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{JobsConfig, SyncConfig};
use crate::errors::tracker::{ErrorReport, ErrorTracker};
use crate::errors::{ErrorProvider, ErrorStage};
use crate::jobs::runner::JobRunner;
use crate::jobs::JobKind;
use crate::repositories::{CounterUpdate, JobRepository, SessionCounters, SyncSessionRepository};
use crate::sync::{
    IntegrationDirectory, ProviderSync, SyncError, SyncOptions, SyncParams, SyncProgress,
    SyncWindow,
};

/// Item and job counts from one blocking sync.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_items: i32,
    pub imported_items: i32,
    pub failed_items: i32,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

/// Result of a successful blocking sync.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockingSyncResult {
    pub session_id: Uuid,
    pub message: String,
    pub stats: SyncStats,
    /// True when the sync itself succeeded but the inline normalization
    /// drain had failures.
    pub partial_failure: bool,
}

/// Coordinates one blocking sync per call. Stateless between calls; all
/// state lives in the session row and the job store.
#[derive(Clone)]
pub struct SyncOrchestrator {
    sessions: SyncSessionRepository,
    jobs: JobRepository,
    runner: JobRunner,
    tracker: ErrorTracker,
    integrations: Arc<dyn IntegrationDirectory>,
    provider: Arc<dyn ProviderSync>,
    sync_config: SyncConfig,
    jobs_config: JobsConfig,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SyncSessionRepository,
        jobs: JobRepository,
        runner: JobRunner,
        tracker: ErrorTracker,
        integrations: Arc<dyn IntegrationDirectory>,
        provider: Arc<dyn ProviderSync>,
        sync_config: SyncConfig,
        jobs_config: JobsConfig,
    ) -> Self {
        Self {
            sessions,
            jobs,
            runner,
            tracker,
            integrations,
            provider,
            sync_config,
            jobs_config,
        }
    }

    /// Run one blocking sync for the user.
    ///
    /// Fails without creating a session when the integration is missing.
    /// Provider failure marks the session `failed` and propagates; no
    /// normalization job is enqueued on that path. Drain failures after a
    /// successful provider sync complete the session but set
    /// `partial_failure` on the result.
    pub async fn sync_blocking(
        &self,
        user_id: Uuid,
        service: ErrorProvider,
        options: SyncOptions,
    ) -> Result<BlockingSyncResult, SyncError> {
        if !self.integrations.has_integration(user_id, service).await? {
            tracing::info!(user_id = %user_id, service = %service, "Sync refused: no integration");
            return Err(SyncError::MissingIntegration {
                service: service.as_str().to_string(),
            });
        }

        let window = self.resolve_window(user_id, &options).await;
        let preferences =
            serde_json::to_value(window).map_err(|e| SyncError::Other(e.into()))?;

        let session = self
            .sessions
            .create(user_id, service.as_str(), preferences)
            .await?;
        let session_id = session.id;
        let batch_id = Uuid::new_v4();

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            batch_id = %batch_id,
            service = %service,
            "Blocking sync started"
        );

        self.sessions
            .update_progress(
                session_id,
                "importing",
                &format!("Importing from {}", service),
                5,
                CounterUpdate::default(),
            )
            .await?;

        let outcome = self.run_provider(user_id, service, window, batch_id, session_id).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                let message = error.to_string();
                self.tracker
                    .record_error(
                        user_id,
                        ErrorReport::new(service, ErrorStage::Ingestion, message.clone())
                            .with_operation("blocking_sync")
                            .with_session(session_id)
                            .with_batch(batch_id),
                    )
                    .await;
                if let Err(e) = self.sessions.fail(session_id, &message).await {
                    tracing::error!(session_id = %session_id, "Failed to mark session failed: {}", e);
                }
                tracing::warn!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Blocking sync failed during import: {}",
                    message
                );
                return Err(error);
            }
        };

        let counters = SessionCounters {
            total_items: outcome.total_items,
            imported_items: outcome.imported_items,
            failed_items: outcome.failed_items,
        };

        self.sessions
            .update_progress(
                session_id,
                "processing",
                "Processing synced data",
                75,
                counters.into(),
            )
            .await?;

        self.jobs
            .enqueue(
                user_id,
                batch_id,
                &JobKind::Normalize,
                serde_json::json!({
                    "provider": service.as_str(),
                    "session_id": session_id,
                    "total_items": outcome.imported_items,
                }),
            )
            .await?;

        let drain = self
            .runner
            .process_user_jobs(user_id, Some(self.jobs_config.drain_max))
            .await?;

        let partial_failure = drain.failed > 0;
        if partial_failure {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session_id,
                failed = drain.failed,
                "Inline drain after sync had failures: {:?}",
                drain.errors
            );
        }

        self.sessions
            .complete(session_id, "Sync complete", counters)
            .await?;

        let message = format!(
            "Synced {} of {} items from {} ({} jobs processed, {} failed)",
            outcome.imported_items,
            outcome.total_items,
            service,
            drain.processed(),
            drain.failed
        );

        tracing::info!(user_id = %user_id, session_id = %session_id, "Blocking sync completed");

        Ok(BlockingSyncResult {
            session_id,
            message,
            stats: SyncStats {
                total_items: outcome.total_items,
                imported_items: outcome.imported_items,
                failed_items: outcome.failed_items,
                jobs_succeeded: drain.succeeded,
                jobs_failed: drain.failed,
            },
            partial_failure,
        })
    }

    /// Options override stored preferences, which override configured
    /// defaults. A preference lookup failure falls back to defaults.
    async fn resolve_window(&self, user_id: Uuid, options: &SyncOptions) -> SyncWindow {
        let base = match self.integrations.sync_preferences(user_id).await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => SyncWindow::from_defaults(&self.sync_config),
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Failed to load sync preferences: {}", e);
                SyncWindow::from_defaults(&self.sync_config)
            }
        };

        options.apply_to(base)
    }

    /// Invoke the provider with a progress channel; updates are applied to
    /// the session concurrently while the provider runs. The consumer task
    /// is joined before returning so no update lands after finalization.
    async fn run_provider(
        &self,
        user_id: Uuid,
        service: ErrorProvider,
        window: SyncWindow,
        batch_id: Uuid,
        session_id: Uuid,
    ) -> Result<crate::sync::ProviderSyncOutcome, SyncError> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<SyncProgress>();

        let sessions = self.sessions.clone();
        let consumer = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                let counters = CounterUpdate {
                    total_items: update.total_items,
                    imported_items: update.imported_items,
                    failed_items: update.failed_items,
                };
                if let Err(e) = sessions
                    .update_progress(
                        session_id,
                        "importing",
                        &update.current_step,
                        update.progress_percentage,
                        counters,
                    )
                    .await
                {
                    tracing::warn!(session_id = %session_id, "Failed to apply progress update: {}", e);
                }
            }
        });

        let result = self
            .provider
            .sync(
                user_id,
                SyncParams {
                    window,
                    batch_id,
                    session_id,
                    progress: progress_tx,
                },
            )
            .await;

        // Sender dropped with SyncParams; the consumer drains and exits.
        if let Err(e) = consumer.await {
            tracing::warn!(session_id = %session_id, service = %service, "Progress consumer panicked: {}", e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorTrackingConfig;
    use crate::errors::DefaultClassifier;
    use crate::jobs::{HandlerRegistry, JobError, JobHandler};
    use crate::models::job::Model as Job;
    use crate::repositories::{ErrorRecordRepository, ErrorSummaryFilter};
    use async_trait::async_trait;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};

    struct OkHandler;

    #[async_trait]
    impl JobHandler for OkHandler {
        async fn execute(&self, _job: &Job) -> Result<(), JobError> {
            Ok(())
        }
    }

    struct FailHandler;

    #[async_trait]
    impl JobHandler for FailHandler {
        async fn execute(&self, _job: &Job) -> Result<(), JobError> {
            Err(JobError::handler("normalization blew up"))
        }
    }

    struct StaticDirectory {
        connected: bool,
        preferences: Option<SyncWindow>,
    }

    #[async_trait]
    impl IntegrationDirectory for StaticDirectory {
        async fn has_integration(
            &self,
            _user_id: Uuid,
            _service: ErrorProvider,
        ) -> anyhow::Result<bool> {
            Ok(self.connected)
        }

        async fn sync_preferences(&self, _user_id: Uuid) -> anyhow::Result<Option<SyncWindow>> {
            Ok(self.preferences)
        }
    }

    struct ScriptedProvider {
        outcome: Result<crate::sync::ProviderSyncOutcome, String>,
        steps: Vec<SyncProgress>,
    }

    #[async_trait]
    impl ProviderSync for ScriptedProvider {
        async fn sync(
            &self,
            _user_id: Uuid,
            params: SyncParams,
        ) -> Result<crate::sync::ProviderSyncOutcome, SyncError> {
            for step in &self.steps {
                let _ = params.progress.send(step.clone());
            }
            match &self.outcome {
                Ok(outcome) => Ok(*outcome),
                Err(message) => Err(SyncError::Provider(message.clone())),
            }
        }
    }

    struct Harness {
        db: DatabaseConnection,
        orchestrator: SyncOrchestrator,
        sessions: SyncSessionRepository,
        jobs: JobRepository,
    }

    async fn setup(
        directory: StaticDirectory,
        provider: ScriptedProvider,
        registry: HandlerRegistry,
    ) -> Harness {
        let db = Database::connect("sqlite::memory:").await.expect("db");
        Migrator::up(&db, None).await.expect("migrations");

        let jobs = JobRepository::new(db.clone());
        let sessions = SyncSessionRepository::new(db.clone());
        let tracker = ErrorTracker::new(
            ErrorRecordRepository::new(db.clone()),
            Arc::new(DefaultClassifier),
            ErrorTrackingConfig::default(),
        );
        let runner = JobRunner::new(
            jobs.clone(),
            Arc::new(registry),
            tracker.clone(),
            JobsConfig::default(),
        );
        let orchestrator = SyncOrchestrator::new(
            sessions.clone(),
            jobs.clone(),
            runner,
            tracker,
            Arc::new(directory),
            Arc::new(provider),
            SyncConfig::default(),
            JobsConfig::default(),
        );

        Harness {
            db,
            orchestrator,
            sessions,
            jobs,
        }
    }

    fn ok_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(JobKind::Normalize, Arc::new(OkHandler));
        registry
    }

    #[tokio::test]
    async fn test_happy_path_completes_session() {
        let harness = setup(
            StaticDirectory {
                connected: true,
                preferences: None,
            },
            ScriptedProvider {
                outcome: Ok(crate::sync::ProviderSyncOutcome {
                    total_items: 12,
                    imported_items: 11,
                    failed_items: 1,
                }),
                steps: vec![SyncProgress {
                    current_step: "Importing messages".to_string(),
                    progress_percentage: 40,
                    total_items: Some(12),
                    imported_items: Some(4),
                    failed_items: Some(0),
                }],
            },
            ok_registry(),
        )
        .await;

        let user_id = Uuid::new_v4();
        let result = harness
            .orchestrator
            .sync_blocking(user_id, ErrorProvider::Gmail, SyncOptions::default())
            .await
            .expect("sync succeeds");

        assert!(!result.partial_failure);
        assert_eq!(result.stats.imported_items, 11);
        assert_eq!(result.stats.jobs_succeeded, 1);
        assert!(result.message.contains("Synced 11 of 12 items from gmail"));

        let session = harness
            .sessions
            .find_owned(user_id, result.session_id)
            .await
            .unwrap()
            .expect("session exists");
        assert_eq!(session.status, "completed");
        assert_eq!(session.progress_percentage, 100);
        assert!(session.completed_at.is_some());
        assert!(session.error_details.is_none());
    }

    #[tokio::test]
    async fn test_missing_integration_creates_no_session() {
        let harness = setup(
            StaticDirectory {
                connected: false,
                preferences: None,
            },
            ScriptedProvider {
                outcome: Ok(Default::default()),
                steps: vec![],
            },
            ok_registry(),
        )
        .await;

        let user_id = Uuid::new_v4();
        let error = harness
            .orchestrator
            .sync_blocking(user_id, ErrorProvider::Calendar, SyncOptions::default())
            .await
            .expect_err("must refuse");

        assert!(matches!(error, SyncError::MissingIntegration { .. }));
        let sessions = harness.sessions.recent_for_user(user_id, 10).await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_marks_session_failed_and_enqueues_nothing() {
        let harness = setup(
            StaticDirectory {
                connected: true,
                preferences: None,
            },
            ScriptedProvider {
                outcome: Err("quota exceeded".to_string()),
                steps: vec![],
            },
            ok_registry(),
        )
        .await;

        let user_id = Uuid::new_v4();
        let error = harness
            .orchestrator
            .sync_blocking(user_id, ErrorProvider::Gmail, SyncOptions::default())
            .await
            .expect_err("provider failure propagates");
        assert!(error.to_string().contains("quota exceeded"));

        let sessions = harness.sessions.recent_for_user(user_id, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, "failed");
        assert!(sessions[0].completed_at.is_some());
        let details = sessions[0].error_details.as_ref().expect("error details");
        assert!(
            details["error"]
                .as_str()
                .unwrap()
                .contains("quota exceeded")
        );

        // No normalization job on the failure path.
        let counts = harness.jobs.status_counts(user_id, None).await.unwrap();
        assert!(counts.is_empty());

        // The failure is recorded and classified.
        let errors = ErrorRecordRepository::new(harness.db.clone())
            .list_for_summary(user_id, &ErrorSummaryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, "ingestion");
    }

    #[tokio::test]
    async fn test_drain_failure_sets_partial_failure() {
        let mut registry = HandlerRegistry::new();
        registry.register(JobKind::Normalize, Arc::new(FailHandler));

        let harness = setup(
            StaticDirectory {
                connected: true,
                preferences: None,
            },
            ScriptedProvider {
                outcome: Ok(crate::sync::ProviderSyncOutcome {
                    total_items: 3,
                    imported_items: 3,
                    failed_items: 0,
                }),
                steps: vec![],
            },
            registry,
        )
        .await;

        let user_id = Uuid::new_v4();
        let result = harness
            .orchestrator
            .sync_blocking(user_id, ErrorProvider::Gmail, SyncOptions::default())
            .await
            .expect("sync still completes");

        assert!(result.partial_failure);
        assert_eq!(result.stats.jobs_failed, 1);

        let session = harness
            .sessions
            .find_owned(user_id, result.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, "completed");
    }

    #[tokio::test]
    async fn test_progress_updates_preferences_and_monotonic_floor() {
        let harness = setup(
            StaticDirectory {
                connected: true,
                preferences: Some(SyncWindow {
                    days_past: 90,
                    days_future: 10,
                    max_results: 250,
                }),
            },
            ScriptedProvider {
                outcome: Ok(crate::sync::ProviderSyncOutcome {
                    total_items: 2,
                    imported_items: 2,
                    failed_items: 0,
                }),
                // A stale 1% update must not drag the session backwards.
                steps: vec![SyncProgress {
                    current_step: "Late low update".to_string(),
                    progress_percentage: 1,
                    total_items: None,
                    imported_items: None,
                    failed_items: None,
                }],
            },
            ok_registry(),
        )
        .await;

        let user_id = Uuid::new_v4();
        let result = harness
            .orchestrator
            .sync_blocking(
                user_id,
                ErrorProvider::Calendar,
                SyncOptions {
                    days_past: Some(14),
                    ..Default::default()
                },
            )
            .await
            .expect("sync succeeds");

        let session = harness
            .sessions
            .find_owned(user_id, result.session_id)
            .await
            .unwrap()
            .unwrap();
        // Options layered over stored preferences.
        assert_eq!(session.preferences["days_past"], 14);
        assert_eq!(session.preferences["days_future"], 10);
        assert_eq!(session.preferences["max_results"], 250);
        assert_eq!(session.progress_percentage, 100);
    }
}
