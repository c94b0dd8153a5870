//! 監査レコードストレージ（SQLite）

use crate::audit::types::{AuditRecord, StatusBucket};
use crate::common::error::{AuditError, AuditResult};
use crate::db::traits::AuditStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

const SELECT_COLUMNS: &str = "SELECT id, request_timestamp, http_method, endpoint_path, \
     client_ip, user_agent, request_body_serialized, response_status, \
     response_body_serialized, processing_time_ms, error_summary, identified_user \
     FROM audit_records";

const ORDER_NEWEST_FIRST: &str = "ORDER BY request_timestamp DESC, id DESC";

/// タイムスタンプを保存形式に変換する
///
/// マイクロ秒固定・UTC（`Z`）なので文字列比較が時系列順と一致する。
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> AuditResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuditError::Database(format!("Failed to parse request_timestamp: {}", e)))
}

/// sqlx::FromRow用の行構造体
#[derive(Debug, sqlx::FromRow)]
struct AuditRecordRow {
    id: i64,
    request_timestamp: String,
    http_method: String,
    endpoint_path: String,
    client_ip: Option<String>,
    user_agent: Option<String>,
    request_body_serialized: Option<String>,
    response_status: Option<i64>,
    response_body_serialized: Option<String>,
    processing_time_ms: i64,
    error_summary: Option<String>,
    identified_user: Option<String>,
}

impl TryFrom<AuditRecordRow> for AuditRecord {
    type Error = AuditError;

    fn try_from(row: AuditRecordRow) -> Result<Self, Self::Error> {
        let response_status = row
            .response_status
            .map(u16::try_from)
            .transpose()
            .map_err(|e| AuditError::Database(format!("Invalid response_status: {}", e)))?;

        Ok(AuditRecord {
            id: Some(row.id),
            request_timestamp: parse_timestamp(&row.request_timestamp)?,
            http_method: row.http_method,
            endpoint_path: row.endpoint_path,
            client_ip: row.client_ip,
            user_agent: row.user_agent,
            request_body_serialized: row.request_body_serialized,
            response_status,
            response_body_serialized: row.response_body_serialized,
            processing_time_ms: row.processing_time_ms,
            error_summary: row.error_summary,
            identified_user: row.identified_user,
        })
    }
}

/// sqlx::FromRow用の行構造体（ステータス別件数）
#[derive(Debug, sqlx::FromRow)]
struct StatusCountRow {
    response_status: Option<i64>,
    count: i64,
}

fn into_records(rows: Vec<AuditRecordRow>) -> AuditResult<Vec<AuditRecord>> {
    rows.into_iter()
        .map(AuditRecord::try_from)
        .collect::<Result<Vec<_>, _>>()
}

/// 監査レコードのDB操作
#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// 新しいSqliteAuditStoreを作成
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert(&self, record: &AuditRecord) -> AuditResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO audit_records (
                request_timestamp, http_method, endpoint_path, client_ip,
                user_agent, request_body_serialized, response_status,
                response_body_serialized, processing_time_ms, error_summary,
                identified_user
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(format_timestamp(&record.request_timestamp))
        .bind(&record.http_method)
        .bind(&record.endpoint_path)
        .bind(&record.client_ip)
        .bind(&record.user_agent)
        .bind(&record.request_body_serialized)
        .bind(record.response_status.map(i64::from))
        .bind(&record.response_body_serialized)
        .bind(record.processing_time_ms.max(0))
        .bind(&record.error_summary)
        .bind(&record.identified_user)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Database(format!("Failed to insert audit record: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_by_id(&self, id: i64) -> AuditResult<Option<AuditRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditError::Database(format!("Failed to get audit record: {}", e)))?;

        row.map(AuditRecord::try_from).transpose()
    }

    async fn find_by_endpoint_containing(&self, fragment: &str) -> AuditResult<Vec<AuditRecord>> {
        let sql = format!(
            "{} WHERE instr(lower(endpoint_path), ?) > 0 {}",
            SELECT_COLUMNS, ORDER_NEWEST_FIRST
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            // SQLiteのlower()はASCIIのみ変換する
            .bind(fragment.to_ascii_lowercase())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AuditError::Database(format!("Failed to query audit records by endpoint: {}", e))
            })?;

        into_records(rows)
    }

    async fn find_by_method_and_endpoint(
        &self,
        method: &str,
        endpoint: &str,
    ) -> AuditResult<Vec<AuditRecord>> {
        let sql = format!(
            "{} WHERE http_method = ? AND endpoint_path = ? {}",
            SELECT_COLUMNS, ORDER_NEWEST_FIRST
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(method.to_ascii_uppercase())
            .bind(endpoint)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AuditError::Database(format!("Failed to query audit records by method: {}", e))
            })?;

        into_records(rows)
    }

    async fn find_by_status(&self, status: u16) -> AuditResult<Vec<AuditRecord>> {
        let sql = format!(
            "{} WHERE response_status = ? {}",
            SELECT_COLUMNS, ORDER_NEWEST_FIRST
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(i64::from(status))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AuditError::Database(format!("Failed to query audit records by status: {}", e))
            })?;

        into_records(rows)
    }

    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AuditResult<Vec<AuditRecord>> {
        let sql = format!(
            "{} WHERE request_timestamp >= ? AND request_timestamp < ? {}",
            SELECT_COLUMNS, ORDER_NEWEST_FIRST
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(format_timestamp(&start))
            .bind(format_timestamp(&end))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AuditError::Database(format!("Failed to query audit records by period: {}", e))
            })?;

        into_records(rows)
    }

    async fn find_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<AuditRecord>> {
        let sql = format!(
            "{} WHERE request_timestamp >= ? {}",
            SELECT_COLUMNS, ORDER_NEWEST_FIRST
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(format_timestamp(&since))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AuditError::Database(format!("Failed to query recent audit records: {}", e))
            })?;

        into_records(rows)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> AuditResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM audit_records WHERE request_timestamp >= ?",
        )
        .bind(format_timestamp(&since))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::Database(format!("Failed to count audit records: {}", e)))
    }

    async fn count_by_status_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<StatusBucket>> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"SELECT response_status, COUNT(*) as count
            FROM audit_records
            WHERE request_timestamp >= ?
            GROUP BY response_status
            ORDER BY response_status"#,
        )
        .bind(format_timestamp(&since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AuditError::Database(format!("Failed to count audit records by status: {}", e))
        })?;

        rows.into_iter()
            .map(|row| {
                let status = row
                    .response_status
                    .map(u16::try_from)
                    .transpose()
                    .map_err(|e| {
                        AuditError::Database(format!("Invalid response_status: {}", e))
                    })?;
                Ok(StatusBucket {
                    status,
                    count: row.count,
                })
            })
            .collect()
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> AuditResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM audit_records WHERE request_timestamp < ?",
        )
        .bind(format_timestamp(&cutoff))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AuditError::Database(format!("Failed to count retention candidates: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{sample_record, test_db_pool};
    use chrono::Duration;

    async fn seeded_store() -> SqliteAuditStore {
        let store = SqliteAuditStore::new(test_db_pool().await);
        let now = Utc::now();
        let records = vec![
            sample_record("GET", "/api/pessoas", Some(200), now - Duration::minutes(5)),
            sample_record("POST", "/api/Pessoas", Some(201), now - Duration::minutes(4)),
            sample_record("GET", "/api/cep/01001000", Some(404), now - Duration::hours(3)),
            sample_record("PUT", "/api/pessoas/1", None, now - Duration::days(40)),
        ];
        for record in &records {
            store.insert(record).await.unwrap();
        }
        store
    }

    #[test]
    fn test_format_timestamp_orders_lexically() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + Duration::microseconds(500);
        assert_eq!(format_timestamp(&earlier), "2026-01-01T00:00:00.000000Z");
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
    }

    #[tokio::test]
    async fn test_endpoint_search_folds_ascii_only() {
        let store = SqliteAuditStore::new(test_db_pool().await);
        store
            .insert(&sample_record("GET", "/api/CAFÉ", Some(200), Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.find_by_endpoint_containing("CAFÉ").await.unwrap().len(), 1);
        assert_eq!(store.find_by_endpoint_containing("cafÉ").await.unwrap().len(), 1);
        assert!(store.find_by_endpoint_containing("café").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_get_by_id_round_trip() {
        let store = SqliteAuditStore::new(test_db_pool().await);
        let record = sample_record("POST", "/api/pessoas", None, Utc::now());
        let id = store.insert(&record).await.unwrap();

        let loaded = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.response_status, None);
        assert_eq!(loaded.endpoint_path, "/api/pessoas");
        assert_eq!(
            format_timestamp(&loaded.request_timestamp),
            format_timestamp(&record.request_timestamp)
        );
        assert!(store.get_by_id(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_endpoint_is_case_insensitive() {
        let store = seeded_store().await;
        let found = store.find_by_endpoint_containing("PESSOAS").await.unwrap();
        assert_eq!(found.len(), 3);
        // 新しい順
        assert_eq!(found[0].endpoint_path, "/api/Pessoas");
        assert!(found[0].request_timestamp >= found[1].request_timestamp);
    }

    #[tokio::test]
    async fn test_find_by_method_and_endpoint() {
        let store = seeded_store().await;
        let found = store
            .find_by_method_and_endpoint("get", "/api/pessoas")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].response_status, Some(200));
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = seeded_store().await;
        let found = store.find_by_status(404).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].endpoint_path, "/api/cep/01001000");
    }

    #[tokio::test]
    async fn test_find_by_time_range_is_half_open() {
        let store = SqliteAuditStore::new(test_db_pool().await);
        let start = Utc::now() - Duration::hours(1);
        let end = start + Duration::minutes(30);
        store
            .insert(&sample_record("GET", "/api/a", Some(200), start))
            .await
            .unwrap();
        store
            .insert(&sample_record("GET", "/api/b", Some(200), end))
            .await
            .unwrap();

        let found = store.find_by_time_range(start, end).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].endpoint_path, "/api/a");
    }

    #[tokio::test]
    async fn test_since_queries() {
        let store = seeded_store().await;
        let since = Utc::now() - Duration::hours(1);

        let recent = store.find_since(since).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].request_timestamp >= recent[1].request_timestamp);

        assert_eq!(store.count_since(since).await.unwrap(), 2);
        assert_eq!(
            store
                .count_since(Utc::now() - Duration::days(365))
                .await
                .unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_count_by_status_includes_missing_status() {
        let store = seeded_store().await;
        let buckets = store
            .count_by_status_since(Utc::now() - Duration::days(365))
            .await
            .unwrap();
        assert!(buckets.contains(&StatusBucket {
            status: None,
            count: 1
        }));
        assert!(buckets.contains(&StatusBucket {
            status: Some(200),
            count: 1
        }));
        assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 4);
    }

    #[tokio::test]
    async fn test_count_before() {
        let store = seeded_store().await;
        let cutoff = Utc::now() - Duration::days(30);
        assert_eq!(store.count_before(cutoff).await.unwrap(), 1);
    }
}
