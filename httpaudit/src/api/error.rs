//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::audit::types::CapturedFault;
use crate::common::error::AuditError;
use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Axum用のエラーレスポンス型
///
/// レスポンスのextensionsに `CapturedFault` を載せ、監査キャプチャが障害内容を記録できるようにする。
#[derive(Debug)]
pub struct AppError(pub AuditError);

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // 詳細はログとextensionにのみ残し、クライアントには固定文言を返す
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let payload = json!({
            "error": self.0.external_message()
        });

        let mut response = (status, Json(payload)).into_response();
        response
            .extensions_mut()
            .insert(CapturedFault::new(self.0.kind(), self.0.to_string()));
        response
    }
}
