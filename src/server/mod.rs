//! HTTP surface: the operator API under `/api` and the media proxy under
//! `/media`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub mod auth;
pub mod error;
pub mod routes_admin;
pub mod routes_content;
pub mod routes_media;
pub mod routes_tenants;

pub use error::{ApiResult, AppError};

/// Create the Axum router with all routes.
pub fn build_router(ctx: AppContext) -> Router {
    let api = routes_tenants::tenant_routes()
        .merge(routes_content::content_routes())
        .merge(routes_admin::admin_routes())
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::api_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .merge(routes_media::media_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "ok",
            "transport": ctx.manager.transport_kind(),
            "active_streams": ctx.registry.len(),
        })),
    )
}

/// Serve until SIGINT/SIGTERM, then cancel streams and close channels.
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    if ctx.config.server.api_key.is_none() {
        tracing::warn!("server.api_key is unset; the operator API is unauthenticated");
    }

    let app = build_router(ctx.clone());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_ctx = ctx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open media bodies would otherwise hold graceful shutdown forever.
            shutdown_ctx.registry.cancel_all();
        })
        .await?;

    ctx.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
