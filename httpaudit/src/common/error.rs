//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! 書き込み側（キャプチャ・記録）のエラーはログに残して握りつぶす。
//! 呼び出し元に返すのは照会APIのエラーのみ。

use axum::http::StatusCode;
use thiserror::Error;

/// audit pipeline error type
#[derive(Debug, Error)]
pub enum AuditError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    /// Returns a safe error message for external clients.
    ///
    /// Full error details (SQL text, file paths) stay in the server logs.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::Database(_) => "Database error",
            Self::Validation(_) => "Invalid request parameters",
            Self::Config(_) => "Configuration error",
            Self::NotFound(_) => "Not found",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns the variant name, used as the fault kind in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "DatabaseError",
            Self::Validation(_) => "ValidationError",
            Self::Config(_) => "ConfigError",
            Self::NotFound(_) => "NotFoundError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Database(err.to_string())
    }
}

/// 監査パイプラインのResult型
pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_message_hides_details() {
        let err = AuditError::Database("no such table: audit_records at /var/db/x.db".to_string());
        assert_eq!(err.external_message(), "Database error");
        assert!(err.to_string().contains("/var/db/x.db"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuditError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuditError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuditError::Database("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_sqlx_error_maps_to_database() {
        let err: AuditError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), "DatabaseError");
        assert_eq!(err.external_message(), "Database error");
    }
}
