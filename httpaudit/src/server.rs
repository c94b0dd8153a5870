//! axumサーバー起動・シャットダウンハンドリング

use crate::bootstrap::InitContext;
use crate::AppState;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tracing::info;

/// axumサーバーを起動し、シャットダウンシグナルを待機する
///
/// 停止後はレコーダーの処理中の書き込みが終わるまで待つ。
pub async fn run(
    ctx: InitContext,
    bind_addr: &str,
    business: Router<AppState>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("httpaudit server listening on {}", bind_addr);
    serve(ctx, listener, business, shutdown_signal()).await
}

/// 待受済みのリスナーでサーバーを実行する
pub async fn serve<F>(
    ctx: InitContext,
    listener: tokio::net::TcpListener,
    business: Router<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let InitContext {
        state,
        recorder_handle,
    } = ctx;
    let app = crate::api::create_app(state, business);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("HTTP server stopped, flushing audit records");
    recorder_handle.wait().await;
    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
