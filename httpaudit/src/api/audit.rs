//! 監査照会APIハンドラー
//!
//! `/api/audit` 系のエンドポイント。これらへのリクエスト自体はキャプチャされない。

use super::error::AppError;
use crate::audit::service::HealthReport;
use crate::audit::types::{AuditRecord, RetentionCandidates, StatisticsSummary};
use crate::common::error::AuditError;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// 集計期間のデフォルト（時間）
pub const DEFAULT_HOURS: i64 = 24;

/// 保持期限のデフォルト（日）
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// `hours` パラメータ
#[derive(Debug, Deserialize)]
pub struct HoursParams {
    /// 直近何時間を対象にするか（デフォルト: 24）
    pub hours: Option<i64>,
}

/// `endpoint` パラメータ
#[derive(Debug, Deserialize)]
pub struct EndpointParams {
    /// パスの部分文字列
    pub endpoint: String,
}

/// 期間パラメータ（ISO-8601）
#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    /// 開始（含む）
    pub start: String,
    /// 終了（含まない）
    pub end: String,
}

/// メソッド・パス完全一致パラメータ
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// HTTPメソッド
    pub method: String,
    /// リクエストパス
    pub endpoint: String,
}

/// ステータスパラメータ
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    /// HTTPステータスコード
    pub status: u16,
}

/// 保持期限パラメータ
#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    /// 何日より古いレコードを候補とするか（デフォルト: 30）
    pub days: Option<i64>,
}

/// ISO-8601文字列を解釈する（タイムゾーン無しはUTCとみなす）
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, AuditError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|_| AuditError::Validation(format!("invalid ISO-8601 timestamp: {}", value)))
}

/// GET /api/audit/recent - 直近のレコード
pub async fn recent_records(
    State(state): State<AppState>,
    Query(params): Query<HoursParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    let records = state
        .audit_query
        .recent(params.hours.unwrap_or(DEFAULT_HOURS))
        .await?;
    Ok(Json(records))
}

/// GET /api/audit/endpoint - パス部分一致
pub async fn records_by_endpoint(
    State(state): State<AppState>,
    Query(params): Query<EndpointParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    Ok(Json(state.audit_query.by_endpoint(&params.endpoint).await?))
}

/// GET /api/audit/period - 期間指定
pub async fn records_by_period(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    let start = parse_instant(&params.start)?;
    let end = parse_instant(&params.end)?;
    Ok(Json(state.audit_query.by_period(start, end).await?))
}

/// GET /api/audit/search - メソッド・パス完全一致
pub async fn search_records(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    Ok(Json(
        state
            .audit_query
            .by_method_and_endpoint(&params.method, &params.endpoint)
            .await?,
    ))
}

/// GET /api/audit/status - ステータス指定
pub async fn records_by_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    Ok(Json(state.audit_query.by_status(params.status).await?))
}

/// GET /api/audit/records/{id}
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AuditRecord>, AppError> {
    Ok(Json(state.audit_query.get_by_id(id).await?))
}

/// GET /api/audit/statistics - 統計サマリー
pub async fn statistics(
    State(state): State<AppState>,
    Query(params): Query<HoursParams>,
) -> Result<Json<StatisticsSummary>, AppError> {
    let summary = state
        .audit_query
        .statistics(params.hours.unwrap_or(DEFAULT_HOURS))
        .await?;
    Ok(Json(summary))
}

/// GET|DELETE /api/audit/cleanup - 保持期限切れ候補の報告（削除はしない）
pub async fn retention_candidates(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<RetentionCandidates>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_RETENTION_DAYS);
    let report = state.audit_query.retention_candidates(days).await?;
    tracing::info!(
        identified = report.identified,
        cutoff = %report.cutoff,
        "Retention candidates identified"
    );
    Ok(Json(report))
}

/// GET /api/audit/health - ストアの疎通確認
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.audit_query.health().await;
    let status = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::audit_log::SqliteAuditStore;
    use crate::db::test_utils::{sample_record, state_with_store, test_state, FailingStore};
    use crate::db::traits::AuditStore;
    use axum::{body::Body, http::Request, Router};
    use chrono::Duration;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        crate::api::create_app(state, Router::new())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn seed(pool: &sqlx::SqlitePool, records: &[AuditRecord]) {
        let store = SqliteAuditStore::new(pool.clone());
        for record in records {
            store.insert(record).await.unwrap();
        }
    }

    #[test]
    fn test_parse_instant_variants() {
        let utc = parse_instant("2026-10-18T10:00:00Z").unwrap();
        let offset = parse_instant("2026-10-18T12:00:00+02:00").unwrap();
        let naive = parse_instant("2026-10-18T10:00:00").unwrap();
        assert_eq!(utc, offset);
        assert_eq!(utc, naive);
        assert!(matches!(
            parse_instant("yesterday"),
            Err(AuditError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_and_statistics() {
        let (state, pool) = test_state().await;
        let now = Utc::now();
        seed(
            &pool,
            &[
                sample_record("GET", "/api/pessoas", Some(200), now - Duration::minutes(3)),
                sample_record("GET", "/api/pessoas", Some(500), now - Duration::minutes(2)),
                sample_record("GET", "/api/pessoas", None, now - Duration::minutes(1)),
            ],
        )
        .await;

        let (status, json) = get_json(app(state.clone()), "/api/audit/recent").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert!(json[0]["response_status"].is_null());

        let (status, json) = get_json(app(state), "/api/audit/statistics?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_requests"], 3);
        assert_eq!(json["period_hours"], 1);
        assert_eq!(json["status_distribution"]["200"], 1);
        assert_eq!(json["status_distribution"]["500"], 1);
        assert_eq!(json["status_distribution"]["null"], 1);
        assert!(json["queried_at"].is_string());
    }

    #[tokio::test]
    async fn test_endpoint_search_status_and_record_lookup() {
        let (state, pool) = test_state().await;
        let now = Utc::now();
        seed(
            &pool,
            &[
                sample_record("GET", "/api/Pessoas/1", Some(200), now - Duration::minutes(2)),
                sample_record("POST", "/api/pessoas", Some(201), now - Duration::minutes(1)),
            ],
        )
        .await;

        let (_, json) = get_json(app(state.clone()), "/api/audit/endpoint?endpoint=PESSOAS").await;
        assert_eq!(json.as_array().unwrap().len(), 2);

        let (_, json) = get_json(
            app(state.clone()),
            "/api/audit/search?method=POST&endpoint=/api/pessoas",
        )
        .await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (_, json) = get_json(app(state.clone()), "/api/audit/status?status=201").await;
        assert_eq!(json[0]["http_method"], "POST");
        let id = json[0]["id"].as_i64().unwrap();

        let (status, json) = get_json(app(state.clone()), &format!("/api/audit/records/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["endpoint_path"], "/api/pessoas");

        let (status, json) = get_json(app(state), "/api/audit/records/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Not found");
    }

    #[tokio::test]
    async fn test_period_validation() {
        let (state, _pool) = test_state().await;
        let (status, _) = get_json(
            app(state.clone()),
            "/api/audit/period?start=2026-10-18T10:00:00Z&end=2026-10-18T09:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(
            app(state.clone()),
            "/api/audit/period?start=nope&end=2026-10-18T09:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = get_json(
            app(state),
            "/api/audit/period?start=2026-10-18T08:00:00&end=2026-10-18T09:00:00",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_hours_is_bad_request() {
        let (state, _pool) = test_state().await;
        let (status, json) = get_json(app(state), "/api/audit/recent?hours=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid request parameters");
    }

    #[tokio::test]
    async fn test_cleanup_get_and_delete_only_identify() {
        let (state, pool) = test_state().await;
        seed(
            &pool,
            &[sample_record(
                "GET",
                "/api/old",
                Some(200),
                Utc::now() - Duration::days(60),
            )],
        )
        .await;

        let (status, json) = get_json(app(state.clone()), "/api/audit/cleanup").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["identified"], 1);
        assert!(json["cutoff"].is_string());

        let res = app(state)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/audit/cleanup?days=90")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_health_up_and_down() {
        let (state, _pool) = test_state().await;
        let (status, json) = get_json(app(state), "/api/audit/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "UP");
        assert_eq!(json["requests_last_hour"], 0);

        let failing: Arc<dyn AuditStore> = Arc::new(FailingStore);
        let (status, json) = get_json(app(state_with_store(failing)), "/api/audit/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "DOWN");
        assert!(json["error"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_audit_queries_are_not_recorded() {
        let (state, pool) = test_state().await;
        for uri in ["/api/audit/recent", "/api/audit/statistics", "/api/audit/health"] {
            let (status, _) = get_json(app(state.clone()), uri).await;
            assert_eq!(status, StatusCode::OK);
        }
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
