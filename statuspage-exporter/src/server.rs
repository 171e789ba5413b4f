//! axumサーバー起動・シャットダウンハンドリング
//!
//! `/metrics`（Prometheusテキスト形式）と `/health` を公開する。

use crate::metrics::MetricPublisher;
use crate::shutdown::ShutdownController;
use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// メトリクス公開用のルーターを作成
pub fn create_app(publisher: Arc<MetricPublisher>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(publisher)
}

async fn metrics_handler(State(publisher): State<Arc<MetricPublisher>>) -> Response {
    match publisher.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, publisher.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// axumサーバーを起動し、シャットダウンシグナルを待機する
pub async fn run(
    publisher: Arc<MetricPublisher>,
    bind_addr: &str,
    shutdown: ShutdownController,
) -> anyhow::Result<()> {
    let app = create_app(publisher);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Metrics endpoint listening on http://{}/metrics", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Metrics server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
///
/// OSシグナルを受けた場合はコントローラにも伝え、ポーラーを止める。
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
            info!("Shutdown requested, shutting down...");
        }
    }
    shutdown.request_shutdown();
}
