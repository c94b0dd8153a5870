//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, and the audit capture
//! configuration built on top of them.

use crate::audit::middleware::CaptureScope;
use crate::audit::redaction::DEFAULT_TRUNCATE_CHARS;

/// Default upper bound for a request body buffered for replay (10 MiB).
pub const DEFAULT_MAX_BUFFERED_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:~/.httpaudit/audit.db";

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use httpaudit::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("HTTPAUDIT_PORT", "AUDIT_PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Audit capture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Which paths are wrapped and captured.
    pub scope: CaptureScope,
    /// Requests declaring a larger body pass through without capture.
    pub max_buffered_body_bytes: usize,
    /// Character cap applied to serialized snapshots.
    pub truncate_chars: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            scope: CaptureScope::default(),
            max_buffered_body_bytes: DEFAULT_MAX_BUFFERED_BODY_BYTES,
            truncate_chars: DEFAULT_TRUNCATE_CHARS,
        }
    }
}

impl AuditConfig {
    /// Load audit configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scope: CaptureScope {
                api_prefix: get_env_with_fallback_or(
                    "HTTPAUDIT_API_PREFIX",
                    "AUDIT_API_PREFIX",
                    &defaults.scope.api_prefix,
                ),
                excluded_prefix: get_env_with_fallback_or(
                    "HTTPAUDIT_EXCLUDED_PREFIX",
                    "AUDIT_EXCLUDED_PREFIX",
                    &defaults.scope.excluded_prefix,
                ),
            },
            max_buffered_body_bytes: get_env_with_fallback_parse(
                "HTTPAUDIT_MAX_BUFFERED_BODY_BYTES",
                "AUDIT_MAX_BUFFERED_BODY_BYTES",
                defaults.max_buffered_body_bytes,
            ),
            truncate_chars: get_env_with_fallback_parse(
                "HTTPAUDIT_RESPONSE_TRUNCATE_CHARS",
                "AUDIT_TRUNCATE_CHARS",
                defaults.truncate_chars,
            ),
        }
    }
}

/// 許可するCORSオリジン一覧を取得
///
/// 環境変数 `HTTPAUDIT_CORS_ORIGINS`（カンマ区切り）から取得する。
/// 未設定・空の場合は空リスト（全オリジン許可）。
pub fn get_cors_origins() -> Vec<String> {
    get_env_with_fallback("HTTPAUDIT_CORS_ORIGINS", "CORS_ORIGINS")
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// データベースURLを取得
pub fn get_database_url() -> String {
    get_env_with_fallback_or(
        "HTTPAUDIT_DATABASE_URL",
        "DATABASE_URL",
        DEFAULT_DATABASE_URL,
    )
}
