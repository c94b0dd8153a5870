//! サーバー初期化ロジック
//!
//! データベース接続、監査ストア、レコーダー、照会サービスを組み立てる。

use crate::audit::recorder::{AuditRecorder, AuditRecorderConfig, AuditRecorderHandle};
use crate::audit::service::AuditQueryService;
use crate::common::error::AuditResult;
use crate::config::AuditConfig;
use crate::db::audit_log::SqliteAuditStore;
use crate::db::traits::AuditStore;
use crate::AppState;
use std::sync::Arc;
use tracing::info;

/// サーバー初期化結果
///
/// `recorder_handle` はシャットダウン時に書き込み完了を待つために使う。
pub struct InitContext {
    /// アプリケーション状態
    pub state: AppState,
    /// レコーダーのバックグラウンドタスク
    pub recorder_handle: AuditRecorderHandle,
}

/// プールから `AppState` とレコーダーを組み立てる
pub fn build_state(
    db_pool: sqlx::SqlitePool,
    audit_config: AuditConfig,
    recorder_config: AuditRecorderConfig,
) -> InitContext {
    let store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::new(db_pool));
    let (audit_recorder, recorder_handle) = AuditRecorder::spawn(Arc::clone(&store), recorder_config);

    InitContext {
        state: AppState {
            audit_query: AuditQueryService::new(store),
            audit_recorder,
            audit_config,
        },
        recorder_handle,
    }
}

/// サーバー初期化を実行する
///
/// DB接続・マイグレーションの後、環境変数の設定でレコーダーを起動する。
pub async fn initialize(database_url: &str) -> AuditResult<InitContext> {
    info!("httpaudit v{}", env!("CARGO_PKG_VERSION"));

    let db_pool = crate::db::initialize_database(database_url).await?;
    info!("Audit database ready");

    let audit_config = AuditConfig::from_env();
    let recorder_config = AuditRecorderConfig {
        truncate_chars: audit_config.truncate_chars,
        ..AuditRecorderConfig::default()
    };
    info!(
        api_prefix = %audit_config.scope.api_prefix,
        excluded_prefix = %audit_config.scope.excluded_prefix,
        truncate_chars = audit_config.truncate_chars,
        queue_capacity = recorder_config.queue_capacity,
        "Audit capture configured"
    );

    Ok(build_state(db_pool, audit_config, recorder_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{sample_record, test_db_pool};

    #[tokio::test]
    async fn test_build_state_queries_read_the_given_pool() {
        let pool = test_db_pool().await;
        SqliteAuditStore::new(pool.clone())
            .insert(&sample_record("GET", "/api/items", Some(200), chrono::Utc::now()))
            .await
            .unwrap();

        let ctx = build_state(pool, AuditConfig::default(), AuditRecorderConfig::default());
        let since = chrono::Utc::now() - chrono::Duration::hours(1);
        assert_eq!(ctx.state.audit_query.count_since(since).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_initialize_with_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("audit.db").display());

        let ctx = initialize(&url).await.unwrap();
        let report = ctx.state.audit_query.health().await;
        assert!(report.is_up());

        drop(ctx.state);
        tokio::time::timeout(std::time::Duration::from_secs(2), ctx.recorder_handle.wait())
            .await
            .expect("recorder should stop once state is dropped");
    }
}
