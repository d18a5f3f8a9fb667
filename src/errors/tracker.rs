//! # Error Tracker
//!
//! Best-effort error reporting facade. Tracking a failure must never make
//! the caller's situation worse, so every operation catches its own
//! database errors, logs them, and degrades to a neutral default instead of
//! propagating. Recording returns a synthetic `fallback-` id when the store
//! is unavailable so callers always get a correlation handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use serde::Serialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ErrorTrackingConfig;
use crate::errors::{
    ErrorClassifier, ErrorContext, ErrorContextV1, ErrorProvider, ErrorSite, ErrorStage,
};
use crate::models::error_record::Model as ErrorRecord;
use crate::repositories::{ErrorRecordRepository, ErrorSummaryFilter};

/// One failure to record.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub provider: ErrorProvider,
    pub stage: ErrorStage,
    pub error: String,
    pub raw_event_id: Option<Uuid>,
    pub operation: Option<String>,
    pub session_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub item_id: Option<String>,
    pub metadata: JsonValue,
}

impl ErrorReport {
    pub fn new<S: Into<String>>(provider: ErrorProvider, stage: ErrorStage, error: S) -> Self {
        Self {
            provider,
            stage,
            error: error.into(),
            raw_event_id: None,
            operation: None,
            session_id: None,
            batch_id: None,
            item_id: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_operation<S: Into<String>>(mut self, operation: S) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

/// Aggregated view of a user's errors. Records lacking a decodable
/// classification count toward `total` but are excluded from the
/// category/severity breakdowns.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ErrorSummary {
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_provider: BTreeMap<String, u64>,
    /// The 10 most recent classified records
    pub recent: Vec<ErrorSummaryEntry>,
    /// All critical-severity records in the filtered set
    pub critical: Vec<ErrorSummaryEntry>,
    /// Currently-retryable unresolved records
    pub retryable: Vec<ErrorSummaryEntry>,
}

/// One error in the summary listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorSummaryEntry {
    pub id: Uuid,
    pub provider: String,
    pub stage: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub retryable: bool,
    pub retry_count: i32,
    pub resolved: bool,
    pub acknowledged: bool,
    pub created_at: String,
}

/// Best-effort tracker over the error record repository.
#[derive(Clone)]
pub struct ErrorTracker {
    repository: ErrorRecordRepository,
    classifier: Arc<dyn ErrorClassifier>,
    config: ErrorTrackingConfig,
}

impl ErrorTracker {
    pub fn new(
        repository: ErrorRecordRepository,
        classifier: Arc<dyn ErrorClassifier>,
        config: ErrorTrackingConfig,
    ) -> Self {
        Self {
            repository,
            classifier,
            config,
        }
    }

    /// Classify and persist one failure. Returns the record id, or a
    /// synthetic `fallback-` id when the store rejected the write.
    pub async fn record_error(&self, user_id: Uuid, report: ErrorReport) -> String {
        let site = ErrorSite {
            provider: report.provider,
            stage: report.stage,
            operation: report.operation.clone(),
            user_id,
        };
        let classification = self.classifier.classify(&report.error, &site).await;

        let mut context = ErrorContextV1::new(classification);
        context.session_id = report.session_id;
        context.batch_id = report.batch_id;
        context.item_id = report.item_id.clone();
        context.operation = report.operation.clone();
        context.metadata = report.metadata.clone();
        let blob = ErrorContext::V1(context).encode();

        match self
            .repository
            .insert(
                user_id,
                report.raw_event_id,
                report.provider,
                report.stage,
                &report.error,
                Some(blob),
            )
            .await
        {
            Ok(record) => {
                counter!(
                    "wellsync_errors_recorded_total",
                    "provider" => report.provider.as_str(),
                    "stage" => report.stage.as_str(),
                )
                .increment(1);
                tracing::info!(
                    user_id = %user_id,
                    record_id = %record.id,
                    provider = %report.provider,
                    stage = %report.stage,
                    category = ?classification.category,
                    "Error recorded"
                );
                record.id.to_string()
            }
            Err(e) => {
                let fallback = format!("fallback-{}", Uuid::new_v4());
                tracing::warn!(
                    user_id = %user_id,
                    fallback_id = %fallback,
                    "Failed to persist error record, continuing with fallback id: {}",
                    e
                );
                fallback
            }
        }
    }

    /// Record a batch of failures, at most `batch_chunk_size` in flight at
    /// a time so one slow entry cannot stall the whole batch. Returns one
    /// id per report, in input order.
    pub async fn record_error_batch(
        &self,
        user_id: Uuid,
        reports: Vec<ErrorReport>,
    ) -> Vec<String> {
        let mut ids = Vec::with_capacity(reports.len());
        for chunk in reports.chunks(self.config.batch_chunk_size.max(1)) {
            let handles: Vec<_> = chunk
                .iter()
                .map(|report| {
                    let tracker = self.clone();
                    let report = report.clone();
                    tokio::spawn(async move { tracker.record_error(user_id, report).await })
                })
                .collect();

            for handle in handles {
                match handle.await {
                    Ok(id) => ids.push(id),
                    Err(e) => {
                        let fallback = format!("fallback-{}", Uuid::new_v4());
                        tracing::warn!(
                            user_id = %user_id,
                            fallback_id = %fallback,
                            "Error recording task panicked: {}",
                            e
                        );
                        ids.push(fallback);
                    }
                }
            }
        }
        ids
    }

    /// Aggregate the user's errors. Store failures degrade to an empty
    /// summary rather than propagating.
    pub async fn get_error_summary(
        &self,
        user_id: Uuid,
        filter: &ErrorSummaryFilter,
        limit: u64,
    ) -> ErrorSummary {
        let records = match self.repository.list_for_summary(user_id, filter, limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Failed to load error summary: {}", e);
                return ErrorSummary::default();
            }
        };

        let mut summary = ErrorSummary {
            total: records.len() as u64,
            ..Default::default()
        };

        for record in &records {
            let context = record.context.as_ref().and_then(ErrorContext::decode);
            let classification = context.as_ref().map(|c| *c.classification());

            *summary
                .by_provider
                .entry(record.provider.clone())
                .or_insert(0) += 1;

            let Some(c) = classification else {
                continue;
            };

            if let Some(category) = enum_label(&c.category) {
                *summary.by_category.entry(category).or_insert(0) += 1;
            }
            if let Some(severity) = enum_label(&c.severity) {
                *summary.by_severity.entry(severity).or_insert(0) += 1;
            }

            let entry = Self::summary_entry(record, Some(c));
            if summary.recent.len() < 10 {
                summary.recent.push(entry.clone());
            }
            if c.severity == crate::errors::ErrorSeverity::Critical {
                summary.critical.push(entry.clone());
            }
            if c.retryable && record.resolved_at.is_none() && !record.user_acknowledged {
                summary.retryable.push(entry);
            }
        }

        summary
    }

    /// Mark an error acknowledged. Degrades to `false` on store failure.
    pub async fn acknowledge_error(&self, user_id: Uuid, record_id: Uuid) -> bool {
        match self.repository.set_acknowledged(user_id, record_id).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    record_id = %record_id,
                    "Failed to acknowledge error: {}",
                    e
                );
                false
            }
        }
    }

    /// Mark an error resolved, recording how it was resolved in the context
    /// blob. Degrades to `false` on store failure.
    pub async fn resolve_error(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        resolution_method: Option<&str>,
    ) -> bool {
        let context = match self.repository.find_owned(user_id, record_id).await {
            Ok(Some(record)) => Self::amend_context(&record, |v1| {
                v1.resolution_method = resolution_method.map(str::to_string);
            }),
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(record_id = %record_id, "Failed to load error for resolution: {}", e);
                None
            }
        };

        match self.repository.set_resolved(user_id, record_id, context).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    record_id = %record_id,
                    "Failed to resolve error: {}",
                    e
                );
                false
            }
        }
    }

    /// Record the outcome of a retry attempt. A successful retry also
    /// resolves the record. Degrades to `false` on store failure.
    pub async fn record_retry_attempt(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        success: bool,
        failure_details: Option<&str>,
    ) -> bool {
        let context = match self.repository.find_owned(user_id, record_id).await {
            Ok(Some(record)) => Self::amend_context(&record, |v1| {
                if success {
                    v1.resolution_method = Some("retry".to_string());
                } else {
                    v1.last_failure_details = failure_details.map(str::to_string);
                }
            }),
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(record_id = %record_id, "Failed to load error for retry: {}", e);
                None
            }
        };

        match self
            .repository
            .record_retry(user_id, record_id, success, context)
            .await
        {
            Ok(updated) => updated.is_some(),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    record_id = %record_id,
                    "Failed to record retry attempt: {}",
                    e
                );
                false
            }
        }
    }

    /// Errors eligible for automated retry: under the retry cap, past the
    /// minimum interval, and classified retryable. Degrades to empty.
    pub async fn get_retryable_errors(
        &self,
        user_id: Uuid,
        provider: Option<ErrorProvider>,
        limit: u64,
    ) -> Vec<ErrorRecord> {
        let retried_before =
            Utc::now() - Duration::minutes(self.config.min_retry_interval_minutes);

        let candidates = match self
            .repository
            .retry_candidates(
                user_id,
                self.config.max_retry_count,
                retried_before,
                provider,
                limit,
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Failed to load retryable errors: {}", e);
                return Vec::new();
            }
        };

        candidates
            .into_iter()
            .filter(|record| {
                record
                    .context
                    .as_ref()
                    .and_then(ErrorContext::decode)
                    .map(|c| c.classification().retryable)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Remove resolved or acknowledged records older than the retention
    /// window. Returns the number deleted; degrades to 0.
    pub async fn cleanup_old_errors(&self) -> u64 {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);

        match self.repository.delete_closed_before(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "Cleaned up old error records");
                }
                deleted
            }
            Err(e) => {
                tracing::warn!("Failed to clean up old error records: {}", e);
                0
            }
        }
    }

    /// Remove closed records older than an explicit retention window,
    /// overriding the configured one. Returns the number deleted.
    pub async fn cleanup_with_retention(&self, retention_days: i64) -> u64 {
        let cutoff = Utc::now() - Duration::days(retention_days.max(1));

        match self.repository.delete_closed_before(cutoff).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!("Failed to clean up old error records: {}", e);
                0
            }
        }
    }

    /// Summary-entry projection of a stored record, decoding its
    /// classification when present.
    pub fn entry_for(record: &ErrorRecord) -> ErrorSummaryEntry {
        let classification = record
            .context
            .as_ref()
            .and_then(ErrorContext::decode)
            .map(|c| *c.classification());
        Self::summary_entry(record, classification)
    }

    fn amend_context<F>(record: &ErrorRecord, amend: F) -> Option<JsonValue>
    where
        F: FnOnce(&mut ErrorContextV1),
    {
        let decoded = record.context.as_ref().and_then(ErrorContext::decode)?;
        let ErrorContext::V1(mut v1) = decoded;
        amend(&mut v1);
        Some(ErrorContext::V1(v1).encode())
    }

    fn summary_entry(
        record: &ErrorRecord,
        classification: Option<crate::errors::ErrorClassification>,
    ) -> ErrorSummaryEntry {
        ErrorSummaryEntry {
            id: record.id,
            provider: record.provider.clone(),
            stage: record.stage.clone(),
            error: record.error.clone(),
            category: classification.and_then(|c| enum_label(&c.category)),
            severity: classification.and_then(|c| enum_label(&c.severity)),
            retryable: classification.map(|c| c.retryable).unwrap_or(false),
            retry_count: record.retry_count,
            resolved: record.resolved_at.is_some(),
            acknowledged: record.user_acknowledged,
            created_at: record.created_at.to_utc().to_rfc3339(),
        }
    }
}

/// Wire label of a unit enum variant via its serde rename.
fn enum_label<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}
