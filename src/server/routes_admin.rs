//! Operator endpoints: media host inventory, active streams, token minting.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use streamctl_common::{Error, ServerId, ServerStatus};
use streamctl_db::models::Server;
use streamctl_db::pool::get_conn;
use streamctl_db::queries::servers;

use super::error::ApiResult;
use crate::context::AppContext;
use crate::proxy::ActiveStream;
use crate::sync::SyncReport;

pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/servers", get(list_servers))
        .route("/servers/:server_id/status", put(set_server_status))
        .route("/streams", get(list_streams))
        .route("/tenants/:login/streams", delete(cancel_streams))
        .route("/tenants/:login/token", post(issue_token))
}

/// GET /api/servers
async fn list_servers(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Server>>> {
    let conn = get_conn(&ctx.db)?;
    Ok(Json(servers::list_servers(&conn)?))
}

#[derive(Debug, Deserialize)]
pub struct ServerStatusRequest {
    pub status: ServerStatus,
}

/// PUT /api/servers/:server_id/status
async fn set_server_status(
    State(ctx): State<AppContext>,
    Path(server_id): Path<ServerId>,
    Json(payload): Json<ServerStatusRequest>,
) -> ApiResult<Json<SyncReport>> {
    let conn = get_conn(&ctx.db)?;
    if !servers::set_status(&conn, server_id, payload.status)? {
        return Err(Error::not_found("server", server_id).into());
    }
    tracing::info!(server_id = %server_id, status = %payload.status, "Server status changed");
    Ok(Json(SyncReport::ok(format!("server is {}", payload.status))))
}

/// GET /api/streams
async fn list_streams(State(ctx): State<AppContext>) -> Json<Vec<ActiveStream>> {
    Json(ctx.registry.list())
}

/// DELETE /api/tenants/:login/streams
async fn cancel_streams(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> Json<SyncReport> {
    let n = ctx.registry.cancel_tenant(&login);
    Json(SyncReport::ok(format!("cancelled {n} stream(s)")))
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    success: bool,
    message: String,
    token: String,
    expires_in: u64,
}

/// POST /api/tenants/:login/token
async fn issue_token(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    ctx.orchestrator.resolve(&login)?;
    let signer = ctx
        .proxy
        .signer()
        .ok_or_else(|| Error::Conflict("proxy.token_secret is not configured".into()))?;
    let ttl = ctx.config.proxy.token_ttl_secs;
    let token = signer.issue(&login, ttl)?;
    Ok(Json(TokenResponse {
        success: true,
        message: format!("token issued for {login}"),
        token,
        expires_in: ttl,
    }))
}
