//! httpaudit Server Entry Point

use anyhow::Context;
use axum::Router;
use clap::Parser;
use httpaudit::cli::serve::ServeArgs;
use httpaudit::cli::{Cli, Commands};
use httpaudit::{bootstrap, logging, server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init().context("failed to initialize logging")?;

    match cli.command {
        Some(Commands::Stats(args)) => httpaudit::cli::stats::execute(&args).await,
        Some(Commands::Serve(args)) => run_server(args).await,
        None => run_server(ServeArgs::default()).await,
    }
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let ctx = bootstrap::initialize(&args.database_url)
        .await
        .context("failed to initialize audit server")?;

    let bind_addr = args.bind_addr();
    info!("Starting server on {}", bind_addr);
    // 業務ルートは組み込み側で create_app に渡す。単体起動では照会APIのみ提供する
    server::run(ctx, &bind_addr, Router::new())
        .await
        .with_context(|| format!("server error on {}", bind_addr))
}
