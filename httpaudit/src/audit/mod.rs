//! 監査キャプチャパイプライン
//!
//! 再読込可能なエクスチェンジ → キャプチャミドルウェア → 非同期レコーダー → ストア。
//! 照会側は `service` から読み取り専用で参照する。

/// 監査レコードの型定義
pub mod types;

/// 再読込可能なエクスチェンジラッパー
pub mod exchange;

/// 機密情報の除去とシリアライズ
pub mod redaction;

/// 監査キャプチャミドルウェア
pub mod middleware;

/// 非同期レコーダー
pub mod recorder;

/// 照会・統計サービス
pub mod service;
