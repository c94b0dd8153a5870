//! HTTP audit capture pipeline
//!
//! API配下の全エクスチェンジを透過的にキャプチャし、非同期にSQLiteへ記録する。
//! 記録済みレコードは照会・統計APIから参照できる。

#![warn(missing_docs)]

/// 共通型定義（エラー、クライアントIP解決）
pub mod common;

/// 監査キャプチャ・記録・照会
pub mod audit;

/// REST APIハンドラー
pub mod api;

/// データベースアクセス
pub mod db;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// CLIインターフェース
pub mod cli;

/// サーバー初期化ロジック
pub mod bootstrap;

/// axumサーバー起動・シャットダウン
pub mod server;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// 監査レコーダー（非同期書き込み）
    pub audit_recorder: audit::recorder::AuditRecorder,
    /// 監査照会サービス
    pub audit_query: audit::service::AuditQueryService,
    /// 監査キャプチャ設定
    pub audit_config: config::AuditConfig,
}
