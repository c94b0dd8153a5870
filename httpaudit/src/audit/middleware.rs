//! 監査キャプチャミドルウェア
//!
//! APIプレフィックス配下の全リクエストについて、
//! 前処理でリクエストスナップショットを、後処理でレスポンススナップショットを取得し、
//! `AuditRecorder` に非同期で記録させる。監査照会エンドポイント自身は対象外。

use crate::audit::exchange::{self, ReplayableResponse};
use crate::audit::recorder::AuditRecorder;
use crate::audit::redaction::{is_body_bearing, redact_headers};
use crate::audit::types::{
    CaptureValue, CapturePayload, CapturedFault, ExchangeOutcome, IdentifiedUser,
    RequestSnapshot, ResponseSnapshot,
};
use crate::common::ip::ClientOrigin;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{trace, warn};

/// キャプチャ対象パスの範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureScope {
    /// ラップ・キャプチャ対象のパスプレフィックス
    pub api_prefix: String,
    /// キャプチャから除外するパスプレフィックス（監査照会API）
    pub excluded_prefix: String,
}

impl Default for CaptureScope {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
            excluded_prefix: "/api/audit".to_string(),
        }
    }
}

impl CaptureScope {
    /// 監査照会APIへのリクエストか
    pub fn is_excluded(&self, path: &str) -> bool {
        let prefix = self.excluded_prefix.trim_end_matches('/');
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// キャプチャ対象か（APIプレフィックス配下かつ除外対象外）
    pub fn captures(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix) && !self.is_excluded(path)
    }
}

/// リクエストスコープのキャプチャ状態
///
/// 前処理で作成し、ハンドラー実行後の後処理に値で引き渡す。
#[derive(Debug)]
pub struct CaptureContext {
    started: Instant,
    started_at: DateTime<Utc>,
    user_agent: Option<String>,
    origin: ClientOrigin,
    snapshot: RequestSnapshot,
}

impl CaptureContext {
    /// 前処理: 開始時刻とリクエストスナップショットを取得する
    ///
    /// ボディはPOST/PUT/PATCHかつ非空の場合のみ保持する。
    pub fn pre_handle(request: &Request<Body>, body: Option<&Bytes>) -> Self {
        let started = Instant::now();
        let started_at = Utc::now();
        let headers = request.headers();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let body = if is_body_bearing(request.method()) {
            body.filter(|b| !b.is_empty()).map(|b| {
                let content_type = exchange::content_type(headers);
                CaptureValue::from_bytes(b, content_type.as_deref())
            })
        } else {
            None
        };

        let snapshot = RequestSnapshot {
            method: request.method().to_string(),
            uri: request.uri().path().to_string(),
            query_string: request.uri().query().map(|q| q.to_string()),
            headers: redact_headers(headers),
            body,
        };

        Self {
            started,
            started_at,
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
            origin: ClientOrigin::capture(headers, peer),
            snapshot,
        }
    }

    /// 後処理: 経過時間を確定し、ペイロードをレコーダーへ引き渡す
    ///
    /// レコーダーへの送信はブロックしない。
    pub fn post_complete(
        self,
        outcome: ExchangeOutcome,
        identified_user: Option<String>,
        recorder: &AuditRecorder,
    ) {
        let elapsed_ms = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);

        trace!(
            method = %self.snapshot.method,
            path = %self.snapshot.uri,
            status = ?outcome.response().map(|r| r.status),
            duration_ms = elapsed_ms,
            "audit capture completed"
        );

        recorder.record(CapturePayload {
            started_at: self.started_at,
            method: self.snapshot.method.clone(),
            path: self.snapshot.uri.clone(),
            user_agent: self.user_agent,
            origin: self.origin,
            request: self.snapshot,
            outcome,
            elapsed_ms,
            identified_user,
        });
    }
}

/// バッファ済みレスポンスからハンドラーチェーンの結果を組み立てる
fn outcome_from_response(replay: &ReplayableResponse) -> ExchangeOutcome {
    let content_type = replay.content_type();
    let body = replay
        .body()
        .map(|bytes| CaptureValue::from_bytes(bytes, content_type.as_deref()));

    ExchangeOutcome::Responded {
        response: ResponseSnapshot {
            status: replay.status().as_u16(),
            content_type,
            body,
        },
        fault: replay.extension::<CapturedFault>(),
    }
}

/// panicペイロードを障害情報に変換する
fn fault_from_panic(panic: &(dyn Any + Send)) -> CapturedFault {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    CapturedFault::new("panic", message)
}

/// 監査キャプチャミドルウェア
///
/// APIプレフィックス外・監査照会APIはラップせずそのまま通す。
/// ハンドラーがpanicした場合も記録した上でpanicを再送出する。
pub async fn audit_capture_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let scope = &state.audit_config.scope;
    if !scope.captures(request.uri().path()) {
        return next.run(request).await;
    }

    let buffered =
        exchange::buffer_request(request, state.audit_config.max_buffered_body_bytes).await;

    let context = CaptureContext::pre_handle(&buffered.request, buffered.body.as_ref());

    match AssertUnwindSafe(next.run(buffered.request))
        .catch_unwind()
        .await
    {
        Ok(response) => {
            let replay = ReplayableResponse::capture(response).await;
            let outcome = outcome_from_response(&replay);
            let identified_user = replay.extension::<IdentifiedUser>().map(|u| u.0);
            context.post_complete(outcome, identified_user, &state.audit_recorder);
            replay.copy_back()
        }
        Err(panic) => {
            let fault = fault_from_panic(panic.as_ref());
            warn!(fault = %fault.summary(), "Handler panicked during audited exchange");
            context.post_complete(
                ExchangeOutcome::Aborted(fault),
                None,
                &state.audit_recorder,
            );
            std::panic::resume_unwind(panic)
        }
    }
}
