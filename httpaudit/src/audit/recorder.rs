//! 監査レコードの非同期レコーダー
//!
//! mpscチャネルでキャプチャ済みペイロードを受信し、
//! 1件ごとに独立したタスクでシリアライズ・IP解決・永続化を行う。
//! 失敗はログに残して破棄する（再試行しない）。

use crate::audit::redaction::{serialize_or_fallback, truncate_with_marker, DEFAULT_TRUNCATE_CHARS};
use crate::audit::types::{AuditRecord, CapturePayload};
use crate::config::get_env_with_fallback_parse;
use crate::db::traits::AuditStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// レコーダー設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRecorderConfig {
    /// 未処理ペイロードの上限。デフォルト: 10000
    pub queue_capacity: usize,
    /// シリアライズ後の保存文字数上限。デフォルト: 5000
    pub truncate_chars: usize,
}

impl Default for AuditRecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: get_env_with_fallback_parse(
                "HTTPAUDIT_RECORDER_QUEUE_CAPACITY",
                "AUDIT_QUEUE_CAPACITY",
                10_000,
            ),
            truncate_chars: get_env_with_fallback_parse(
                "HTTPAUDIT_RESPONSE_TRUNCATE_CHARS",
                "AUDIT_TRUNCATE_CHARS",
                DEFAULT_TRUNCATE_CHARS,
            ),
        }
    }
}

/// キャプチャ済みペイロードから永続化用レコードを組み立てる
///
/// シリアライズに失敗した部分は理由を示す文字列に置き換わる。
pub fn build_record(payload: CapturePayload, truncate_chars: usize) -> AuditRecord {
    let request_body_serialized = Some(truncate_with_marker(
        serialize_or_fallback(&payload.request, "request data"),
        truncate_chars,
    ));
    let response_body_serialized = payload.outcome.response().map(|response| {
        truncate_with_marker(
            serialize_or_fallback(response, "response data"),
            truncate_chars,
        )
    });

    AuditRecord {
        id: None,
        request_timestamp: payload.started_at,
        http_method: payload.method,
        endpoint_path: payload.path,
        client_ip: payload.origin.resolve(),
        user_agent: payload.user_agent,
        request_body_serialized,
        response_status: payload.outcome.response().map(|r| r.status),
        response_body_serialized,
        processing_time_ms: payload.elapsed_ms.max(0),
        error_summary: payload.outcome.fault().map(|f| f.summary()),
        identified_user: payload.identified_user,
    }
}

/// 監査レコードの非同期レコーダー
///
/// Clone可能（senderのクローン）。全クローンがdropされるとバックグラウンドタスクは
/// 処理中の書き込みを待って終了する。
#[derive(Clone)]
pub struct AuditRecorder {
    sender: mpsc::Sender<CapturePayload>,
}

/// バックグラウンドタスクの終了待ちハンドル
pub struct AuditRecorderHandle {
    task: JoinHandle<()>,
}

impl AuditRecorderHandle {
    /// 全レコーダーがdropされた後、処理中の書き込み完了を待つ
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!("Audit recorder task terminated abnormally: {}", e);
        }
    }
}

impl AuditRecorder {
    /// 新しいAuditRecorderを作成し、バックグラウンドタスクを起動
    pub fn spawn(
        store: Arc<dyn AuditStore>,
        config: AuditRecorderConfig,
    ) -> (Self, AuditRecorderHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(Self::background_task(rx, store, config.truncate_chars));
        (Self { sender: tx }, AuditRecorderHandle { task })
    }

    /// ペイロードを送信（ブロックしない）
    ///
    /// キューが満杯・停止済みの場合は破棄してログに残す。
    pub fn record(&self, payload: CapturePayload) {
        if let Err(e) = self.sender.try_send(payload) {
            let (reason, payload) = match e {
                mpsc::error::TrySendError::Full(p) => ("queue full", p),
                mpsc::error::TrySendError::Closed(p) => ("recorder stopped", p),
            };
            warn!(
                method = %payload.method,
                path = %payload.path,
                "Dropping audit record ({})",
                reason
            );
        }
    }

    async fn background_task(
        mut rx: mpsc::Receiver<CapturePayload>,
        store: Arc<dyn AuditStore>,
        truncate_chars: usize,
    ) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                payload = rx.recv() => {
                    match payload {
                        Some(payload) => {
                            let store = Arc::clone(&store);
                            in_flight.spawn(async move {
                                Self::persist(store.as_ref(), payload, truncate_chars).await;
                            });
                        }
                        None => break,
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Audit record task failed: {}", e);
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                "Audit recorder shutting down, waiting for {} in-flight writes",
                in_flight.len()
            );
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Audit record task failed: {}", e);
            }
        }
        info!("Audit recorder background task stopped");
    }

    /// 1件を永続化する（失敗はログのみ）
    async fn persist(store: &dyn AuditStore, payload: CapturePayload, truncate_chars: usize) {
        let record = build_record(payload, truncate_chars);
        match store.insert(&record).await {
            Ok(id) => debug!(
                id,
                method = %record.http_method,
                path = %record.endpoint_path,
                "Audit record persisted"
            ),
            Err(e) => error!(
                method = %record.http_method,
                path = %record.endpoint_path,
                "Failed to persist audit record, dropping it: {}",
                e
            ),
        }
    }
}
