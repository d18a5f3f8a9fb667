//! # Job Status Aggregator
//!
//! Read-only view over the job store: queue counts, pending jobs, data
//! freshness, completion estimate, stuck jobs, and a composite health
//! score. Any internal fetch failure degrades to an all-zero report with a
//! `critical` health status; this path never returns an error because
//! status dashboards must not crash when the store is down.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::jobs::{JobKind, JobStatus};
use crate::models::job::Model as Job;
use crate::repositories::JobRepository;

/// Counts of stored items used for the freshness view. Supplied by an
/// external collaborator since the ingested data lives outside this core.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessCounts {
    pub raw_events: u64,
    pub interactions: u64,
    pub contacts: u64,
}

/// Source of raw-item and normalized-item counts for a user.
#[async_trait]
pub trait FreshnessSource: Send + Sync {
    async fn freshness_counts(&self, user_id: Uuid) -> anyhow::Result<FreshnessCounts>;
}

/// Options for one status computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOptions {
    pub batch_id: Option<Uuid>,
    pub include_history: bool,
    pub include_freshness: bool,
}

/// Per-status and per-kind queue counts.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub status_counts: BTreeMap<String, u64>,
    pub kind_counts: BTreeMap<String, u64>,
    pub total_jobs: u64,
    pub pending_jobs: u64,
    pub failed_jobs: u64,
}

/// One job in the pending or history listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub attempts: i32,
    pub age_minutes: i64,
    pub has_error: bool,
}

/// Raw vs. processed item counts for the user's data.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataFreshness {
    pub raw_events: u64,
    pub interactions: u64,
    pub contacts: u64,
    /// min(100, interactions/raw_events*100); 100 when nothing is ingested
    pub processing_rate: u8,
    pub needs_processing: bool,
    pub pending_by_kind: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<String>,
}

/// Completion estimate over all pending jobs; absent when none are pending.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedCompletion {
    pub estimated_seconds: i64,
    pub estimated_minutes: i64,
    pub estimated_completion_at: String,
}

/// A job sitting in `processing` past the staleness threshold.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StuckJobView {
    pub id: Uuid,
    pub kind: String,
    pub attempts: i32,
    /// Minutes since the last update, not since creation
    pub age_minutes: i64,
}

/// Composite 0-100 queue health.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueHealth {
    pub score: u8,
    pub status: String,
    pub issues: Vec<String>,
}

/// Full status report for a user's job queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub queue: QueueStatus,
    pub pending_jobs: Vec<JobView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_jobs: Option<Vec<JobView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_freshness: Option<DataFreshness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<EstimatedCompletion>,
    pub stuck_jobs: Vec<StuckJobView>,
    pub health: QueueHealth,
}

const PENDING_VIEW_LIMIT: u64 = 50;
const STUCK_VIEW_LIMIT: u64 = 10;
const FRESHNESS_KINDS: [JobKind; 3] = [JobKind::Normalize, JobKind::Embed, JobKind::Insight];

/// Read-only status computation over the job store.
#[derive(Clone)]
pub struct JobStatusAggregator {
    jobs: JobRepository,
    freshness: Arc<dyn FreshnessSource>,
    config: JobsConfig,
}

impl JobStatusAggregator {
    pub fn new(
        jobs: JobRepository,
        freshness: Arc<dyn FreshnessSource>,
        config: JobsConfig,
    ) -> Self {
        Self {
            jobs,
            freshness,
            config,
        }
    }

    /// Compute the full status report. Never fails: fetch errors produce the
    /// all-zero critical report.
    pub async fn comprehensive_status(
        &self,
        user_id: Uuid,
        options: StatusOptions,
    ) -> JobStatusReport {
        match self.compute(user_id, options).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Failed to compute job status: {}", e);
                Self::unavailable_report()
            }
        }
    }

    async fn compute(
        &self,
        user_id: Uuid,
        options: StatusOptions,
    ) -> anyhow::Result<JobStatusReport> {
        let now = Utc::now();

        let status_counts = self.jobs.status_counts(user_id, options.batch_id).await?;
        let kind_counts = self.jobs.kind_counts(user_id, options.batch_id).await?;
        let queue = Self::queue_status(status_counts, kind_counts);

        let pending = self
            .jobs
            .pending_jobs(user_id, options.batch_id, PENDING_VIEW_LIMIT)
            .await?;
        let pending_views: Vec<JobView> =
            pending.iter().map(|job| Self::job_view(job, now)).collect();

        let recent = self
            .jobs
            .recent_jobs(user_id, self.config.recent_window)
            .await?;
        let recent_jobs = options
            .include_history
            .then(|| recent.iter().map(|job| Self::job_view(job, now)).collect());

        let stale_before = now - Duration::minutes(self.config.stuck_threshold_minutes);
        let stuck = self
            .jobs
            .stuck_jobs(user_id, stale_before, STUCK_VIEW_LIMIT)
            .await?;
        let stuck_views: Vec<StuckJobView> = stuck
            .iter()
            .map(|job| StuckJobView {
                id: job.id,
                kind: job.kind.clone(),
                attempts: job.attempts,
                age_minutes: age_minutes(job.updated_at.to_utc(), now),
            })
            .collect();

        let estimated_completion = self
            .estimate_completion(user_id, options.batch_id, now)
            .await?;

        let data_freshness = if options.include_freshness {
            Some(self.data_freshness(user_id, &queue).await?)
        } else {
            None
        };

        let recent_failures = recent
            .iter()
            .filter(|job| job.status == JobStatus::Failed.as_str())
            .count() as u64;

        let health = compute_health(&HealthInputs {
            total_jobs: queue.total_jobs,
            failed_jobs: queue.failed_jobs,
            queued_jobs: queue
                .status_counts
                .get(JobStatus::Queued.as_str())
                .copied()
                .unwrap_or(0),
            stuck_jobs: stuck_views.len() as u64,
            recent_jobs: recent.len() as u64,
            recent_failures,
        });

        Ok(JobStatusReport {
            queue,
            pending_jobs: pending_views,
            recent_jobs,
            data_freshness,
            estimated_completion,
            stuck_jobs: stuck_views,
            health,
        })
    }

    fn queue_status(
        status_counts: BTreeMap<String, u64>,
        kind_counts: BTreeMap<String, u64>,
    ) -> QueueStatus {
        let total_jobs = status_counts.values().sum();
        let pending_jobs = status_counts
            .iter()
            .filter(|(status, _)| {
                JobStatus::parse(status).is_some_and(JobStatus::is_pending)
            })
            .map(|(_, count)| count)
            .sum();
        let failed_jobs = status_counts
            .get(JobStatus::Failed.as_str())
            .copied()
            .unwrap_or(0);

        QueueStatus {
            status_counts,
            kind_counts,
            total_jobs,
            pending_jobs,
            failed_jobs,
        }
    }

    /// ETA over the pending jobs in view; scoped to the requested batch so
    /// it is absent exactly when the report shows zero pending jobs.
    async fn estimate_completion(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<EstimatedCompletion>> {
        let pending_by_kind = self.jobs.pending_kind_counts(user_id, batch_id, None).await?;
        if pending_by_kind.values().all(|&count| count == 0) {
            return Ok(None);
        }

        let estimated_seconds: i64 = pending_by_kind
            .iter()
            .map(|(kind, count)| {
                JobKind::parse(kind).estimated_duration_secs() * *count as i64
            })
            .sum();

        Ok(Some(EstimatedCompletion {
            estimated_seconds,
            estimated_minutes: estimated_seconds.unsigned_abs().div_ceil(60) as i64,
            estimated_completion_at: (now + Duration::seconds(estimated_seconds)).to_rfc3339(),
        }))
    }

    async fn data_freshness(
        &self,
        user_id: Uuid,
        queue: &QueueStatus,
    ) -> anyhow::Result<DataFreshness> {
        let counts = self.freshness.freshness_counts(user_id).await?;
        let pending_by_kind = self
            .jobs
            .pending_kind_counts(user_id, None, Some(&FRESHNESS_KINDS))
            .await?;
        let last_processed_at = self.jobs.last_completed_at(user_id).await?;

        // Nothing ingested means nothing is waiting on processing.
        let processing_rate = if counts.raw_events == 0 {
            100
        } else {
            let rate = (counts.interactions as f64 / counts.raw_events as f64 * 100.0).round();
            rate.min(100.0) as u8
        };

        let needs_processing = [JobStatus::Queued, JobStatus::Processing]
            .iter()
            .any(|status| {
                queue
                    .status_counts
                    .get(status.as_str())
                    .is_some_and(|&count| count > 0)
            });

        Ok(DataFreshness {
            raw_events: counts.raw_events,
            interactions: counts.interactions,
            contacts: counts.contacts,
            processing_rate,
            needs_processing,
            pending_by_kind,
            last_processed_at: last_processed_at.map(|t| t.to_rfc3339()),
        })
    }

    fn job_view(job: &Job, now: DateTime<Utc>) -> JobView {
        JobView {
            id: job.id,
            kind: job.kind.clone(),
            status: job.status.clone(),
            attempts: job.attempts,
            age_minutes: age_minutes(job.created_at.to_utc(), now),
            has_error: job.last_error.is_some(),
        }
    }

    fn unavailable_report() -> JobStatusReport {
        JobStatusReport {
            queue: QueueStatus::default(),
            pending_jobs: Vec::new(),
            recent_jobs: None,
            data_freshness: None,
            estimated_completion: None,
            stuck_jobs: Vec::new(),
            health: QueueHealth {
                score: 0,
                status: "critical".to_string(),
                issues: vec!["Unable to fetch job status".to_string()],
            },
        }
    }
}

fn age_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ((now - since).num_seconds() as f64 / 60.0).round() as i64
}

/// Inputs to the health computation, kept separate so scoring is testable
/// without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthInputs {
    pub total_jobs: u64,
    pub failed_jobs: u64,
    pub queued_jobs: u64,
    pub stuck_jobs: u64,
    pub recent_jobs: u64,
    pub recent_failures: u64,
}

const RECENT_FAILURE_GRACE: u64 = 3;

/// Additive-deduction health score: failures, stuck jobs, backlog, and a
/// recent-failure streak each pull the score down from 100.
pub fn compute_health(inputs: &HealthInputs) -> QueueHealth {
    let total = inputs.total_jobs.max(1) as f64;

    let failure_penalty = inputs.failed_jobs as f64 / total * 40.0;
    let stuck_penalty = inputs.stuck_jobs as f64 * 20.0;

    let backlog_ratio = inputs.queued_jobs as f64 / total;
    let backlog_penalty = if backlog_ratio > 0.5 {
        (backlog_ratio - 0.5) * 30.0
    } else {
        0.0
    };

    let excess_failures = inputs.recent_failures.saturating_sub(RECENT_FAILURE_GRACE);
    let recent_penalty = excess_failures as f64 * 5.0;

    let raw = 100.0 - failure_penalty - stuck_penalty - backlog_penalty - recent_penalty;
    let score = raw.clamp(0.0, 100.0).round() as u8;

    let status = match score {
        90..=100 => "excellent",
        70..=89 => "good",
        50..=69 => "warning",
        _ => "critical",
    };

    let mut issues = Vec::new();
    if inputs.stuck_jobs > 0 {
        issues.push(format!("{} stuck job(s) detected", inputs.stuck_jobs));
    }
    if inputs.failed_jobs > 5 {
        issues.push(format!("High number of failed jobs: {}", inputs.failed_jobs));
    }
    if inputs.recent_jobs > 0
        && inputs.recent_failures as f64 / inputs.recent_jobs as f64 > 0.2
    {
        issues.push(format!(
            "High failure rate: {} of the last {} jobs failed",
            inputs.recent_failures, inputs.recent_jobs
        ));
    }
    if inputs.queued_jobs > 50 {
        issues.push(format!("Large backlog: {} queued jobs", inputs.queued_jobs));
    }

    QueueHealth {
        score,
        status: status.to_string(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::ActiveModel;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use serde_json::json;

    struct StubFreshness(FreshnessCounts);

    #[async_trait]
    impl FreshnessSource for StubFreshness {
        async fn freshness_counts(&self, _user_id: Uuid) -> anyhow::Result<FreshnessCounts> {
            Ok(self.0)
        }
    }

    async fn setup(counts: FreshnessCounts) -> (DatabaseConnection, JobStatusAggregator) {
        let db = Database::connect("sqlite::memory:").await.expect("db");
        Migrator::up(&db, None).await.expect("migrations");
        let aggregator = JobStatusAggregator::new(
            JobRepository::new(db.clone()),
            Arc::new(StubFreshness(counts)),
            JobsConfig::default(),
        );
        (db, aggregator)
    }

    async fn insert_job(
        db: &DatabaseConnection,
        user_id: Uuid,
        kind: &str,
        status: &str,
        age: Duration,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let then = (Utc::now() - age).fixed_offset();
        ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            batch_id: Set(Uuid::new_v4()),
            kind: Set(kind.to_string()),
            status: Set(status.to_string()),
            attempts: Set(0),
            payload: Set(json!({})),
            last_error: Set(None),
            created_at: Set(then),
            updated_at: Set(then),
        }
        .insert(db)
        .await
        .expect("insert job");
        id
    }

    #[tokio::test]
    async fn test_queue_count_arithmetic() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();

        let spread = [
            ("queued", 5),
            ("processing", 2),
            ("completed", 100),
            ("failed", 3),
            ("retrying", 1),
        ];
        for (status, count) in spread {
            for _ in 0..count {
                insert_job(&db, user_id, "normalize", status, Duration::minutes(1)).await;
            }
        }

        let report = aggregator
            .comprehensive_status(user_id, StatusOptions::default())
            .await;

        assert_eq!(report.queue.total_jobs, 111);
        assert_eq!(report.queue.pending_jobs, 8);
        assert_eq!(report.queue.failed_jobs, 3);
        assert_eq!(
            report.queue.total_jobs,
            report.queue.status_counts.values().sum::<u64>()
        );
    }

    #[tokio::test]
    async fn test_eta_sums_duration_table() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();

        insert_job(&db, user_id, "normalize", "queued", Duration::minutes(1)).await;
        insert_job(&db, user_id, "embed", "queued", Duration::minutes(1)).await;
        insert_job(&db, user_id, "insight", "queued", Duration::minutes(1)).await;

        let report = aggregator
            .comprehensive_status(user_id, StatusOptions::default())
            .await;

        let eta = report.estimated_completion.expect("pending jobs have an ETA");
        assert_eq!(eta.estimated_seconds, 17);
        assert_eq!(eta.estimated_minutes, 1);
    }

    #[tokio::test]
    async fn test_eta_absent_without_pending_jobs() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();

        insert_job(&db, user_id, "normalize", "completed", Duration::minutes(1)).await;
        insert_job(&db, user_id, "embed", "failed", Duration::minutes(1)).await;

        let report = aggregator
            .comprehensive_status(user_id, StatusOptions::default())
            .await;

        assert!(report.estimated_completion.is_none());
    }

    #[tokio::test]
    async fn test_stuck_job_sixty_minutes() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();

        insert_job(&db, user_id, "embed", "processing", Duration::minutes(60)).await;

        let report = aggregator
            .comprehensive_status(user_id, StatusOptions::default())
            .await;

        assert_eq!(report.stuck_jobs.len(), 1);
        assert_eq!(report.stuck_jobs[0].age_minutes, 60);
        // One stuck job costs exactly 20 points.
        assert_eq!(report.health.score, 80);
        assert!(report.health.issues.iter().any(|i| i.contains("stuck")));
    }

    #[tokio::test]
    async fn test_freshness_zero_raw_events_is_full_rate() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();

        insert_job(&db, user_id, "normalize", "queued", Duration::minutes(1)).await;

        let report = aggregator
            .comprehensive_status(
                user_id,
                StatusOptions {
                    include_freshness: true,
                    ..Default::default()
                },
            )
            .await;

        let freshness = report.data_freshness.expect("requested freshness");
        assert_eq!(freshness.processing_rate, 100);
        assert!(freshness.needs_processing);
        assert_eq!(freshness.pending_by_kind.get("normalize"), Some(&1));
    }

    #[tokio::test]
    async fn test_freshness_rate_is_capped() {
        let (db, aggregator) = setup(FreshnessCounts {
            raw_events: 10,
            interactions: 25,
            contacts: 3,
        })
        .await;
        let user_id = Uuid::new_v4();
        insert_job(&db, user_id, "normalize", "completed", Duration::minutes(1)).await;

        let report = aggregator
            .comprehensive_status(
                user_id,
                StatusOptions {
                    include_freshness: true,
                    ..Default::default()
                },
            )
            .await;

        let freshness = report.data_freshness.expect("requested freshness");
        assert_eq!(freshness.processing_rate, 100);
        assert!(!freshness.needs_processing);
        assert!(freshness.last_processed_at.is_some());
    }

    #[tokio::test]
    async fn test_batch_scoping() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();
        let jobs = JobRepository::new(db.clone());

        let batch_a = Uuid::new_v4();
        let batch_b = Uuid::new_v4();
        jobs.enqueue(user_id, batch_a, &JobKind::Normalize, json!({}))
            .await
            .unwrap();
        jobs.enqueue(user_id, batch_b, &JobKind::Embed, json!({}))
            .await
            .unwrap();

        let report = aggregator
            .comprehensive_status(
                user_id,
                StatusOptions {
                    batch_id: Some(batch_a),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(report.queue.total_jobs, 1);
        assert_eq!(report.pending_jobs.len(), 1);
        assert_eq!(report.pending_jobs[0].kind, "normalize");
    }

    #[tokio::test]
    async fn test_eta_scoped_to_requested_batch() {
        let (db, aggregator) = setup(FreshnessCounts::default()).await;
        let user_id = Uuid::new_v4();
        let jobs = JobRepository::new(db.clone());

        // Batch A is fully drained; batch B still has a pending job.
        let batch_a = Uuid::new_v4();
        jobs.enqueue(user_id, batch_a, &JobKind::Normalize, json!({}))
            .await
            .unwrap();
        let claimed = jobs.claim_eligible(user_id, 10).await.unwrap();
        jobs.mark_completed(&claimed[0]).await.unwrap();
        jobs.enqueue(user_id, Uuid::new_v4(), &JobKind::Embed, json!({}))
            .await
            .unwrap();

        let report = aggregator
            .comprehensive_status(
                user_id,
                StatusOptions {
                    batch_id: Some(batch_a),
                    ..Default::default()
                },
            )
            .await;

        // No pending jobs in view means no ETA, even with pending work in
        // another batch.
        assert_eq!(report.queue.pending_jobs, 0);
        assert!(report.estimated_completion.is_none());

        let unscoped = aggregator
            .comprehensive_status(user_id, StatusOptions::default())
            .await;
        assert_eq!(unscoped.queue.pending_jobs, 1);
        assert!(unscoped.estimated_completion.is_some());
    }

    #[test]
    fn test_health_empty_queue_is_excellent() {
        let health = compute_health(&HealthInputs::default());
        assert_eq!(health.score, 100);
        assert_eq!(health.status, "excellent");
        assert!(health.issues.is_empty());
    }

    #[test]
    fn test_health_monotonic_in_failures() {
        let mut previous = 100;
        for failed in 0..=20 {
            let health = compute_health(&HealthInputs {
                total_jobs: 20,
                failed_jobs: failed,
                ..Default::default()
            });
            assert!(health.score <= previous);
            previous = health.score;
        }
        // All-failed queue loses the full 40-point failure penalty.
        assert_eq!(previous, 60);
    }

    #[test]
    fn test_health_clamps_at_zero() {
        let health = compute_health(&HealthInputs {
            total_jobs: 10,
            stuck_jobs: 10,
            ..Default::default()
        });
        assert_eq!(health.score, 0);
        assert_eq!(health.status, "critical");
    }

    #[test]
    fn test_health_backlog_and_recent_failure_penalties() {
        // 100% queued: backlog ratio 1.0 → (1.0-0.5)*30 = 15 points.
        let health = compute_health(&HealthInputs {
            total_jobs: 100,
            queued_jobs: 100,
            ..Default::default()
        });
        assert_eq!(health.score, 85);
        assert!(health.issues.iter().any(|i| i.contains("backlog")));

        // 5 recent failures: 2 over the grace of 3 → 10 points.
        let health = compute_health(&HealthInputs {
            total_jobs: 100,
            recent_jobs: 20,
            recent_failures: 5,
            ..Default::default()
        });
        assert_eq!(health.score, 90);
        assert!(health.issues.iter().any(|i| i.contains("failure rate")));
    }

    #[test]
    fn test_health_bands() {
        for (score_inputs, expected) in [
            (HealthInputs::default(), "excellent"),
            (
                HealthInputs {
                    total_jobs: 10,
                    stuck_jobs: 1,
                    ..Default::default()
                },
                "good",
            ),
            (
                HealthInputs {
                    total_jobs: 10,
                    stuck_jobs: 2,
                    ..Default::default()
                },
                "warning",
            ),
            (
                HealthInputs {
                    total_jobs: 10,
                    stuck_jobs: 3,
                    ..Default::default()
                },
                "critical",
            ),
        ] {
            assert_eq!(compute_health(&score_inputs).status, expected);
        }
    }
}
