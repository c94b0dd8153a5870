//! 監査レコードの照会・統計サービス
//!
//! 読み取り専用。書き込みは `AuditRecorder` のみが行う。

use crate::audit::types::{AuditRecord, RetentionCandidates, StatisticsSummary, StatusBucket};
use crate::common::error::{AuditError, AuditResult};
use crate::db::traits::AuditStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// ステータス未確定バケットのキー
pub const MISSING_STATUS_KEY: &str = "null";

/// 保持期限レポートの補足文
pub const RETENTION_NOTE: &str =
    "Records were only identified. Deletion requires a separately authorized administrative action.";

/// ヘルスチェック結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// `UP` または `DOWN`
    pub status: &'static str,
    /// 直近1時間のリクエスト数（UP時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_last_hour: Option<i64>,
    /// エラー内容（DOWN時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 判定時刻
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// ストアが応答したか
    pub fn is_up(&self) -> bool {
        self.status == "UP"
    }
}

fn hours_window(hours: i64) -> AuditResult<Duration> {
    if hours < 0 {
        return Err(AuditError::Validation(format!(
            "hours must not be negative: {}",
            hours
        )));
    }
    Duration::try_hours(hours)
        .ok_or_else(|| AuditError::Validation(format!("hours out of range: {}", hours)))
}

fn days_window(days: i64) -> AuditResult<Duration> {
    if days < 0 {
        return Err(AuditError::Validation(format!(
            "days must not be negative: {}",
            days
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| AuditError::Validation(format!("days out of range: {}", days)))
}

fn instant_before(now: DateTime<Utc>, window: Duration) -> AuditResult<DateTime<Utc>> {
    now.checked_sub_signed(window)
        .ok_or_else(|| AuditError::Validation("window reaches before the supported time range".into()))
}

/// ステータス別件数をJSON向けのマップに変換する
pub fn distribution_map(buckets: &[StatusBucket]) -> BTreeMap<String, i64> {
    let mut map = BTreeMap::new();
    for bucket in buckets {
        let key = bucket
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| MISSING_STATUS_KEY.to_string());
        *map.entry(key).or_insert(0) += bucket.count;
    }
    map
}

/// 監査レコード照会サービス
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditStore>,
}

impl AuditQueryService {
    /// 新しいサービスを作成
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// 直近 `hours` 時間のレコード（新しい順）
    pub async fn recent(&self, hours: i64) -> AuditResult<Vec<AuditRecord>> {
        let since = instant_before(Utc::now(), hours_window(hours)?)?;
        self.store.find_since(since).await
    }

    /// エンドポイントパスの部分一致（大文字小文字無視）
    pub async fn by_endpoint(&self, fragment: &str) -> AuditResult<Vec<AuditRecord>> {
        if fragment.is_empty() {
            return Err(AuditError::Validation("endpoint must not be empty".into()));
        }
        self.store.find_by_endpoint_containing(fragment).await
    }

    /// `[start, end)` 期間のレコード
    pub async fn by_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AuditResult<Vec<AuditRecord>> {
        if start > end {
            return Err(AuditError::Validation(format!(
                "start ({}) must not be after end ({})",
                start, end
            )));
        }
        self.store.find_by_time_range(start, end).await
    }

    /// HTTPメソッドとパスの完全一致
    pub async fn by_method_and_endpoint(
        &self,
        method: &str,
        endpoint: &str,
    ) -> AuditResult<Vec<AuditRecord>> {
        if method.is_empty() || endpoint.is_empty() {
            return Err(AuditError::Validation(
                "method and endpoint are required".into(),
            ));
        }
        self.store.find_by_method_and_endpoint(method, endpoint).await
    }

    /// ステータスコードで検索
    pub async fn by_status(&self, status: u16) -> AuditResult<Vec<AuditRecord>> {
        if !(100..=999).contains(&status) {
            return Err(AuditError::Validation(format!(
                "invalid status code: {}",
                status
            )));
        }
        self.store.find_by_status(status).await
    }

    /// IDで取得（存在しなければ `NotFound`）
    pub async fn get_by_id(&self, id: i64) -> AuditResult<AuditRecord> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("audit record {}", id)))
    }

    /// 指定時刻以降の件数
    pub async fn count_since(&self, since: DateTime<Utc>) -> AuditResult<i64> {
        self.store.count_since(since).await
    }

    /// 指定時刻以降のステータス別件数
    pub async fn status_distribution(
        &self,
        since: DateTime<Utc>,
    ) -> AuditResult<BTreeMap<String, i64>> {
        let buckets = self.store.count_by_status_since(since).await?;
        Ok(distribution_map(&buckets))
    }

    /// 直近 `hours` 時間の統計サマリー
    pub async fn statistics(&self, hours: i64) -> AuditResult<StatisticsSummary> {
        let queried_at = Utc::now();
        let since = instant_before(queried_at, hours_window(hours)?)?;
        let total_requests = self.count_since(since).await?;
        let status_distribution = self.status_distribution(since).await?;

        Ok(StatisticsSummary {
            total_requests,
            status_distribution,
            period_hours: hours,
            queried_at,
        })
    }

    /// `days` 日より古いレコードを削除候補として数える（削除はしない）
    pub async fn retention_candidates(&self, days: i64) -> AuditResult<RetentionCandidates> {
        let cutoff = instant_before(Utc::now(), days_window(days)?)?;
        let identified = self.store.count_before(cutoff).await?;
        Ok(RetentionCandidates {
            identified,
            cutoff,
            note: RETENTION_NOTE.to_string(),
        })
    }

    /// ヘルスチェック（直近1時間の件数を数えられればUP）
    pub async fn health(&self) -> HealthReport {
        let timestamp = Utc::now();
        match self.count_since(timestamp - Duration::hours(1)).await {
            Ok(count) => HealthReport {
                status: "UP",
                requests_last_hour: Some(count),
                error: None,
                timestamp,
            },
            Err(e) => {
                warn!("Audit store health check failed: {}", e);
                HealthReport {
                    status: "DOWN",
                    requests_last_hour: None,
                    error: Some(e.external_message().to_string()),
                    timestamp,
                }
            }
        }
    }
}
