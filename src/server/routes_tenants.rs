//! Tenant-level route handlers: lifecycle, sync, transmissions, usage.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use streamctl_common::{ConfigState, Error, PlaylistId};
use streamctl_db::models::Transmission;
use streamctl_db::pool::get_conn;
use streamctl_db::queries::transmissions;
use streamctl_remote::UsageSummary;

use super::auth::caller_role;
use super::error::ApiResult;
use crate::context::AppContext;
use crate::lifecycle::{ActionOutcome, AppAction, StatusReport};
use crate::sync::{SyncReport, TransmissionReport};

pub fn tenant_routes() -> Router<AppContext> {
    Router::new()
        .route("/tenants/:login/app/:action", post(app_action))
        .route("/tenants/:login/status", get(status))
        .route("/tenants/:login/sync", post(sync))
        .route("/tenants/:login/provision", post(provision))
        .route("/tenants/:login/usage", get(usage))
        .route(
            "/tenants/:login/transmission",
            get(active_transmission)
                .post(start_transmission)
                .delete(end_transmission),
        )
}

/// POST /api/tenants/:login/app/:action
async fn app_action(
    State(ctx): State<AppContext>,
    Path((login, action)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<ActionOutcome>> {
    let action: AppAction = action.parse().map_err(Error::Validation)?;
    let role = caller_role(&headers)?;
    let (server, tenant) = ctx.orchestrator.resolve(&login)?;

    tracing::info!(login = %login, action = ?action, role = ?role, "Lifecycle action requested");
    let outcome = ctx
        .lifecycle
        .perform(action, &server, &tenant, role)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    report: StatusReport,
    config: ConfigState,
}

/// GET /api/tenants/:login/status
async fn status(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let (server, tenant) = ctx.orchestrator.resolve(&login)?;
    let report = ctx.lifecycle.status(&server, &tenant).await?;
    Ok(Json(StatusResponse {
        success: true,
        message: format!("{login} is {}", report.state),
        config: ctx.generator.state(tenant.id),
        report,
    }))
}

/// POST /api/tenants/:login/sync
async fn sync(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<SyncReport>> {
    Ok(Json(ctx.orchestrator.sync_tenant(&login).await?))
}

/// POST /api/tenants/:login/provision
async fn provision(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<SyncReport>> {
    Ok(Json(ctx.orchestrator.provision_tenant(&login).await?))
}

#[derive(Debug, Serialize)]
struct UsageResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    usage: UsageSummary,
}

/// GET /api/tenants/:login/usage
async fn usage(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<UsageResponse>> {
    let usage = ctx.orchestrator.usage(&login).await?;
    let message = match usage.percent {
        Some(p) => format!("{} bytes used ({p:.1}% of limit)", usage.used_bytes),
        None => format!("{} bytes used", usage.used_bytes),
    };
    Ok(Json(UsageResponse {
        success: true,
        message,
        usage,
    }))
}

#[derive(Debug, Serialize)]
struct ActiveTransmissionResponse {
    success: bool,
    message: String,
    transmission: Option<Transmission>,
}

/// GET /api/tenants/:login/transmission
async fn active_transmission(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<ActiveTransmissionResponse>> {
    let (_, tenant) = ctx.orchestrator.resolve(&login)?;
    let conn = get_conn(&ctx.db)?;
    let transmission = transmissions::get_active(&conn, tenant.id)?;
    let message = if transmission.is_some() {
        "transmission active"
    } else {
        "no active transmission"
    };
    Ok(Json(ActiveTransmissionResponse {
        success: true,
        message: message.to_string(),
        transmission,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StartTransmissionRequest {
    pub playlist_id: Option<PlaylistId>,
    pub source: Option<String>,
}

/// POST /api/tenants/:login/transmission
async fn start_transmission(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
    Json(payload): Json<StartTransmissionRequest>,
) -> ApiResult<Json<TransmissionReport>> {
    let report = ctx
        .orchestrator
        .start_transmission(&login, payload.playlist_id, payload.source.as_deref())
        .await?;
    Ok(Json(report))
}

/// DELETE /api/tenants/:login/transmission
async fn end_transmission(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<SyncReport>> {
    Ok(Json(ctx.orchestrator.end_transmission(&login).await?))
}
