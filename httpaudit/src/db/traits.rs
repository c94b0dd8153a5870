//! Repository traitパターン定義
//!
//! 監査ストアを抽象化し、SQLite実装とテスト用ダブルを差し替え可能にする。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::types::{AuditRecord, StatusBucket};
use crate::common::error::AuditResult;

/// 監査ストアのRepository trait
///
/// 一覧系はすべてタイムスタンプ降順（同時刻はID降順）で返す。
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// レコードを挿入し、採番されたIDを返す
    async fn insert(&self, record: &AuditRecord) -> AuditResult<i64>;
    /// IDでレコードを取得
    async fn get_by_id(&self, id: i64) -> AuditResult<Option<AuditRecord>>;
    /// エンドポイントパスの部分一致（大文字小文字無視）で検索
    async fn find_by_endpoint_containing(&self, fragment: &str) -> AuditResult<Vec<AuditRecord>>;
    /// HTTPメソッドとエンドポイントパスの完全一致で検索
    async fn find_by_method_and_endpoint(
        &self,
        method: &str,
        endpoint: &str,
    ) -> AuditResult<Vec<AuditRecord>>;
    /// ステータスコードで検索
    async fn find_by_status(&self, status: u16) -> AuditResult<Vec<AuditRecord>>;
    /// `[start, end)` の範囲で検索
    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AuditResult<Vec<AuditRecord>>;
    /// 指定時刻以降のレコードを取得
    async fn find_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<AuditRecord>>;
    /// 指定時刻以降のレコード数
    async fn count_since(&self, since: DateTime<Utc>) -> AuditResult<i64>;
    /// 指定時刻以降のステータス別件数（ステータス未確定を含む）
    async fn count_by_status_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<StatusBucket>>;
    /// 指定時刻より古いレコード数
    async fn count_before(&self, cutoff: DateTime<Utc>) -> AuditResult<i64>;
}
