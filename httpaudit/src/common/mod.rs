//! 共通ユーティリティ

/// エラー型定義
pub mod error;

/// クライアントIP解決
pub mod ip;
