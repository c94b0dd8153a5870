//! データベースアクセス層
//!
//! SQLiteベースの監査レコード永続化

/// 監査レコードストレージ
pub mod audit_log;

/// Repository traitパターン（テスタビリティ向上）
pub mod traits;

use crate::common::error::{AuditError, AuditResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// `~/` で始まるパスをホームディレクトリに展開する
pub fn expand_home(database_url: &str) -> String {
    let Some(path) = database_url.strip_prefix("sqlite:") else {
        return database_url.to_string();
    };
    let Some(rest) = path.strip_prefix("~/") else {
        return database_url.to_string();
    };
    match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        Ok(home) => format!("sqlite:{}/{}", home.trim_end_matches('/'), rest),
        Err(_) => database_url.to_string(),
    }
}

/// SQLite接続プールを初期化し、マイグレーションを実行する
///
/// ファイルDBの場合は親ディレクトリを先に作成する。
pub async fn initialize_database(database_url: &str) -> AuditResult<SqlitePool> {
    let database_url = expand_home(database_url);

    if let Some(path) = database_url.strip_prefix("sqlite:") {
        // `sqlite::memory:` のような特殊指定はスキップ
        if !path.starts_with(':') {
            let normalized = path.trim_start_matches("//");
            let path_without_params = normalized.split('?').next().unwrap_or(normalized);
            if let Some(parent) = std::path::Path::new(path_without_params).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AuditError::Config(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&database_url)
        .map_err(|e| AuditError::Config(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePool::connect_with(connect_options)
        .await
        .map_err(|e| AuditError::Database(format!("Failed to connect to database: {}", e)))?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// マイグレーションを実行（sqlx::migrate!マクロを使用）
pub async fn run_migrations(pool: &SqlitePool) -> AuditResult<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AuditError::Database(format!("Failed to run migrations: {}", e)))?;

    info!("Database migrations completed successfully");
    Ok(())
}
