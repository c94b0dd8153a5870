//! ロギング初期化ユーティリティ
//!
//! コンソール出力に加え、`HTTPAUDIT_LOG_DIR` が設定されていれば日次ローテーションのファイル出力を行う。

use crate::config::get_env_with_fallback;
use crate::common::error::{AuditError, AuditResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "httpaudit";

/// ログレベルのフィルタ文字列を取得する
///
/// `HTTPAUDIT_LOG_LEVEL`（旧: `RUST_LOG`）、未設定なら `info`。
pub fn filter_directive() -> String {
    get_env_with_fallback("HTTPAUDIT_LOG_LEVEL", "RUST_LOG").unwrap_or_else(|| "info".to_string())
}

/// グローバルsubscriberを初期化する
///
/// ファイル出力を有効にした場合、返された `WorkerGuard` をプロセス終了まで保持すること。
pub fn init() -> AuditResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(filter_directive())
        .map_err(|e| AuditError::Config(format!("Invalid log filter: {}", e)))?;

    let console_layer = fmt::layer().with_target(true);

    let (file_layer, guard) = match get_env_with_fallback("HTTPAUDIT_LOG_DIR", "AUDIT_LOG_DIR") {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(&dir)
                .map_err(|e| {
                    AuditError::Config(format!("Failed to create log appender in {}: {}", dir, e))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AuditError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guard)
}
