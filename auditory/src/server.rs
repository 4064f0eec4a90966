//! axumサーバー起動・シャットダウンハンドリング

use crate::bootstrap::{spawn_background_tasks, InitContext};
use crate::config::AuditoryConfig;
use crate::shutdown::ShutdownController;
use anyhow::Context;
use std::future::IntoFuture;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// 管理APIとプロキシを起動し、シャットダウンまで待機する
///
/// シャットダウン後は実行中の定期ジョブの完了を待ってから戻る。
pub async fn run(ctx: InitContext, config: &AuditoryConfig) -> anyhow::Result<()> {
    let shutdown = ctx.state.shutdown.clone();

    // 待ち受けに失敗した場合は定期ジョブを起動せずに終了する
    let listeners = bind_listeners(&ctx, config).await;
    let (control_listener, proxy_listener) = match listeners {
        Ok(listeners) => listeners,
        Err(e) => {
            shutdown.request_shutdown();
            return Err(e);
        }
    };

    tokio::spawn(shutdown_signal(shutdown.clone()));
    let tasks = spawn_background_tasks(&ctx, config);

    info!("Control plane listening on {}", config.control_addr);
    let control = axum::serve(control_listener, crate::api::create_app(ctx.state.clone()))
        .with_graceful_shutdown(wait_owned(shutdown.clone()))
        .into_future();

    let proxy = match (ctx.proxy.clone(), proxy_listener) {
        (Some(proxy_state), Some(listener)) => {
            info!(
                "Proxy listening on {} -> {}",
                config.proxy_addr, proxy_state.target
            );
            let app = crate::api::proxy::create_proxy_app(proxy_state);
            Some(tokio::spawn(
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_owned(shutdown.clone()))
                    .into_future(),
            ))
        }
        _ => None,
    };

    let control_result = control.await;
    // 管理APIが異常終了した場合もプロキシと定期ジョブを止める
    shutdown.request_shutdown();
    control_result.context("control plane server error")?;

    if let Some(proxy) = proxy {
        match proxy.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Proxy server error: {}", e),
            Err(e) => warn!("Proxy server task failed: {}", e),
        }
    }
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task failed: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn bind_listeners(
    ctx: &InitContext,
    config: &AuditoryConfig,
) -> anyhow::Result<(TcpListener, Option<TcpListener>)> {
    let control = TcpListener::bind(&config.control_addr)
        .await
        .with_context(|| format!("failed to bind control plane to {}", config.control_addr))?;
    let proxy = match ctx.proxy {
        Some(_) => Some(
            TcpListener::bind(&config.proxy_addr)
                .await
                .with_context(|| format!("failed to bind proxy to {}", config.proxy_addr))?,
        ),
        None => None,
    };
    Ok((control, proxy))
}

async fn wait_owned(shutdown: ShutdownController) {
    shutdown.wait().await
}

/// OSシグナルを待機し、受信したらシャットダウンを要求する
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
        _ = shutdown.wait() => {
            return;
        }
    }
    shutdown.request_shutdown();
}
