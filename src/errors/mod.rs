//! Error classification taxonomy and the versioned context blob stored on
//! error records.

pub mod tracker;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Provider a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorProvider {
    Gmail,
    Calendar,
    Drive,
}

impl ErrorProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorProvider::Gmail => "gmail",
            ErrorProvider::Calendar => "calendar",
            ErrorProvider::Drive => "drive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gmail" => Some(ErrorProvider::Gmail),
            "calendar" => Some(ErrorProvider::Calendar),
            "drive" => Some(ErrorProvider::Drive),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStage {
    Ingestion,
    Normalization,
    Processing,
}

impl ErrorStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorStage::Ingestion => "ingestion",
            ErrorStage::Normalization => "normalization",
            ErrorStage::Processing => "processing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ingestion" => Some(ErrorStage::Ingestion),
            "normalization" => Some(ErrorStage::Normalization),
            "processing" => Some(ErrorStage::Processing),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    AuthError,
    NetworkError,
    QuotaError,
    DatabaseError,
    PermissionError,
    ConfigError,
    UnknownError,
}

/// How bad a classified failure is for the user's data flow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of classifying a raw error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub user_action_required: bool,
}

/// Where a failure happened, passed to the classifier for context.
#[derive(Debug, Clone)]
pub struct ErrorSite {
    pub provider: ErrorProvider,
    pub stage: ErrorStage,
    pub operation: Option<String>,
    pub user_id: Uuid,
}

/// Versioned context blob persisted on an error record.
///
/// Decoded explicitly so additive fields stay typed; unknown future
/// versions fail decoding loudly instead of silently reading garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum ErrorContext {
    V1(ErrorContextV1),
}

impl ErrorContext {
    pub fn classification(&self) -> &ErrorClassification {
        match self {
            ErrorContext::V1(v1) => &v1.classification,
        }
    }

    pub fn decode(value: &JsonValue) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn encode(&self) -> JsonValue {
        serde_json::to_value(self).expect("context serialization is infallible")
    }
}

/// First context schema: classification plus soft correlation references
/// back to the session/batch that produced the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContextV1 {
    pub classification: ErrorClassification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_details: Option<String>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub metadata: JsonValue,
}

impl ErrorContextV1 {
    pub fn new(classification: ErrorClassification) -> Self {
        Self {
            classification,
            session_id: None,
            batch_id: None,
            item_id: None,
            operation: None,
            resolution_method: None,
            last_failure_details: None,
            metadata: JsonValue::Null,
        }
    }
}

/// Classifies raw errors into the taxonomy. External collaborator contract;
/// the default implementation pattern-matches on the message.
#[async_trait]
pub trait ErrorClassifier: Send + Sync {
    async fn classify(&self, error: &str, site: &ErrorSite) -> ErrorClassification;
}

/// Message-pattern classifier used when no richer classifier is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassifier;

#[async_trait]
impl ErrorClassifier for DefaultClassifier {
    async fn classify(&self, error: &str, site: &ErrorSite) -> ErrorClassification {
        let lowered = error.to_ascii_lowercase();

        let (category, severity, retryable, user_action_required) = if lowered.contains("unauthorized")
            || lowered.contains("invalid_grant")
            || lowered.contains("token expired")
            || lowered.contains("401")
        {
            (ErrorCategory::AuthError, ErrorSeverity::High, true, true)
        } else if lowered.contains("quota") || lowered.contains("rate limit") || lowered.contains("429")
        {
            (ErrorCategory::QuotaError, ErrorSeverity::Medium, true, false)
        } else if lowered.contains("permission") || lowered.contains("forbidden") || lowered.contains("403")
        {
            (
                ErrorCategory::PermissionError,
                ErrorSeverity::High,
                false,
                true,
            )
        } else if lowered.contains("timeout")
            || lowered.contains("connection")
            || lowered.contains("network")
            || lowered.contains("unreachable")
        {
            (
                ErrorCategory::NetworkError,
                ErrorSeverity::Medium,
                true,
                false,
            )
        } else if lowered.contains("database")
            || lowered.contains("constraint")
            || lowered.contains("sqlx")
        {
            (
                ErrorCategory::DatabaseError,
                ErrorSeverity::Critical,
                true,
                false,
            )
        } else if lowered.contains("config") || lowered.contains("missing credential") {
            (ErrorCategory::ConfigError, ErrorSeverity::High, false, true)
        } else {
            (
                ErrorCategory::UnknownError,
                // Ingestion failures block everything downstream
                if site.stage == ErrorStage::Ingestion {
                    ErrorSeverity::High
                } else {
                    ErrorSeverity::Medium
                },
                false,
                false,
            )
        };

        ErrorClassification {
            category,
            severity,
            retryable,
            user_action_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(stage: ErrorStage) -> ErrorSite {
        ErrorSite {
            provider: ErrorProvider::Gmail,
            stage,
            operation: Some("sync".to_string()),
            user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_auth_errors_are_retryable_and_need_user_action() {
        let c = DefaultClassifier
            .classify("401 Unauthorized: token expired", &site(ErrorStage::Ingestion))
            .await;
        assert_eq!(c.category, ErrorCategory::AuthError);
        assert!(c.retryable);
        assert!(c.user_action_required);
    }

    #[tokio::test]
    async fn test_quota_errors_are_retryable() {
        let c = DefaultClassifier
            .classify("quota exceeded for gmail API", &site(ErrorStage::Ingestion))
            .await;
        assert_eq!(c.category, ErrorCategory::QuotaError);
        assert!(c.retryable);
        assert!(!c.user_action_required);
    }

    #[tokio::test]
    async fn test_permission_errors_are_not_retryable() {
        let c = DefaultClassifier
            .classify("403 Forbidden", &site(ErrorStage::Processing))
            .await;
        assert_eq!(c.category, ErrorCategory::PermissionError);
        assert!(!c.retryable);
        assert!(c.user_action_required);
    }

    #[tokio::test]
    async fn test_unknown_errors_default_to_non_retryable() {
        let c = DefaultClassifier
            .classify("something odd happened", &site(ErrorStage::Processing))
            .await;
        assert_eq!(c.category, ErrorCategory::UnknownError);
        assert!(!c.retryable);
        assert_eq!(c.severity, ErrorSeverity::Medium);

        let c = DefaultClassifier
            .classify("something odd happened", &site(ErrorStage::Ingestion))
            .await;
        assert_eq!(c.severity, ErrorSeverity::High);
    }

    #[test]
    fn test_context_roundtrip() {
        let classification = ErrorClassification {
            category: ErrorCategory::NetworkError,
            severity: ErrorSeverity::Medium,
            retryable: true,
            user_action_required: false,
        };
        let mut v1 = ErrorContextV1::new(classification);
        v1.batch_id = Some(Uuid::new_v4());
        v1.operation = Some("calendar_import".to_string());
        let context = ErrorContext::V1(v1.clone());

        let encoded = context.encode();
        assert_eq!(encoded["schema"], "v1");

        let decoded = ErrorContext::decode(&encoded).expect("decode");
        assert_eq!(decoded, ErrorContext::V1(v1));
    }

    #[test]
    fn test_context_unknown_schema_rejected() {
        let blob = serde_json::json!({"schema": "v99", "classification": {}});
        assert!(ErrorContext::decode(&blob).is_none());
    }

    #[test]
    fn test_category_wire_format() {
        let json = serde_json::to_value(ErrorCategory::AuthError).unwrap();
        assert_eq!(json, "AUTH_ERROR");
        let json = serde_json::to_value(ErrorCategory::UnknownError).unwrap();
        assert_eq!(json, "UNKNOWN_ERROR");
    }
}
