//! REST APIハンドラーとルーター構築

/// 監査照会API
pub mod audit;

/// APIエラーレスポンス型
pub mod error;

use crate::audit::middleware::audit_capture_middleware;
use crate::AppState;
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// 監査照会APIのルーター（`excluded_prefix` 配下にネストする）
pub fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/recent", get(audit::recent_records))
        .route("/endpoint", get(audit::records_by_endpoint))
        .route("/period", get(audit::records_by_period))
        .route("/search", get(audit::search_records))
        .route("/status", get(audit::records_by_status))
        .route("/records/{id}", get(audit::get_record))
        .route("/statistics", get(audit::statistics))
        .route(
            "/cleanup",
            get(audit::retention_candidates).delete(audit::retention_candidates),
        )
        .route("/health", get(audit::health))
}

/// CORSレイヤーを構築する（オリジン未指定なら全許可）
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let valid: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if valid.is_empty() {
        layer.allow_origin(Any)
    } else {
        info!("CORS origins configured: {:?}", valid);
        layer.allow_origin(AllowOrigin::list(valid))
    }
}

/// アプリケーションルーターを構築する
///
/// `business` は監査対象となる業務ルート。監査キャプチャは全ルートに掛かるが、
/// 対象外のパスはミドルウェア内で素通しされる。
pub fn create_app(state: AppState, business: Router<AppState>) -> Router {
    let excluded_prefix = state.audit_config.scope.excluded_prefix.clone();
    let cors = cors_layer(&crate::config::get_cors_origins());

    Router::new()
        .nest(&excluded_prefix, audit_routes())
        .merge(business)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            audit_capture_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
