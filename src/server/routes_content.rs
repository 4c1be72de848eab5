//! Folder, playlist and schedule route handlers.
//!
//! Writes that change what the engine should play go through the
//! orchestrator so the playlist document is republished.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use streamctl_common::{Error, FolderId, PlaylistId, ScheduleId, VideoId};
use streamctl_db::models::{Folder, PlaylistItem, ScheduleEntry};
use streamctl_db::pool::get_conn;
use streamctl_db::queries::schedules::{self, NewSchedule};
use streamctl_db::queries::{folders, playlists};

use super::error::ApiResult;
use crate::context::AppContext;
use crate::sync::SyncReport;

pub fn content_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/tenants/:login/folders",
            get(list_folders).post(create_folder),
        )
        .route(
            "/tenants/:login/folders/:folder_id",
            put(rename_folder).delete(delete_folder),
        )
        .route(
            "/tenants/:login/playlists/:playlist_id/items",
            get(list_playlist_items).put(set_playlist_items),
        )
        .route(
            "/tenants/:login/schedules",
            get(list_schedules).post(add_schedule),
        )
        .route("/tenants/:login/schedules/:schedule_id", delete(remove_schedule))
}

#[derive(Debug, Serialize)]
struct FolderResponse {
    success: bool,
    message: String,
    folder: Folder,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    pub name: String,
}

/// GET /api/tenants/:login/folders
async fn list_folders(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<Vec<Folder>>> {
    let (_, tenant) = ctx.orchestrator.resolve(&login)?;
    let conn = get_conn(&ctx.db)?;
    Ok(Json(folders::list_folders(&conn, tenant.id)?))
}

/// POST /api/tenants/:login/folders
async fn create_folder(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
    Json(payload): Json<FolderRequest>,
) -> ApiResult<impl IntoResponse> {
    let folder = ctx.orchestrator.create_folder(&login, &payload.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(FolderResponse {
            success: true,
            message: format!("folder {} ready", folder.sanitized_name),
            folder,
            warnings: Vec::new(),
        }),
    ))
}

/// PUT /api/tenants/:login/folders/:folder_id
async fn rename_folder(
    State(ctx): State<AppContext>,
    Path((login, folder_id)): Path<(String, FolderId)>,
    Json(payload): Json<FolderRequest>,
) -> ApiResult<Json<FolderResponse>> {
    let (folder, report) = ctx
        .orchestrator
        .rename_folder(&login, folder_id, &payload.name)
        .await?;
    Ok(Json(FolderResponse {
        success: report.success,
        message: report.message,
        folder,
        warnings: report.warnings,
    }))
}

/// DELETE /api/tenants/:login/folders/:folder_id
async fn delete_folder(
    State(ctx): State<AppContext>,
    Path((login, folder_id)): Path<(String, FolderId)>,
) -> ApiResult<Json<SyncReport>> {
    ctx.orchestrator.delete_folder(&login, folder_id).await?;
    Ok(Json(SyncReport::ok("folder deleted")))
}

/// GET /api/tenants/:login/playlists/:playlist_id/items
async fn list_playlist_items(
    State(ctx): State<AppContext>,
    Path((login, playlist_id)): Path<(String, PlaylistId)>,
) -> ApiResult<Json<Vec<PlaylistItem>>> {
    let (_, tenant) = ctx.orchestrator.resolve(&login)?;
    let conn = get_conn(&ctx.db)?;
    playlists::get_playlist(&conn, playlist_id)?
        .filter(|p| p.tenant_id == tenant.id)
        .ok_or_else(|| Error::not_found("playlist", playlist_id))?;
    Ok(Json(playlists::list_items(&conn, playlist_id)?))
}

#[derive(Debug, Deserialize)]
pub struct SetItemsRequest {
    pub videos: Vec<VideoId>,
}

/// PUT /api/tenants/:login/playlists/:playlist_id/items
async fn set_playlist_items(
    State(ctx): State<AppContext>,
    Path((login, playlist_id)): Path<(String, PlaylistId)>,
    Json(payload): Json<SetItemsRequest>,
) -> ApiResult<Json<SyncReport>> {
    let report = ctx
        .orchestrator
        .set_playlist_items(&login, playlist_id, &payload.videos)
        .await?;
    Ok(Json(report))
}

/// GET /api/tenants/:login/schedules
async fn list_schedules(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
) -> ApiResult<Json<Vec<ScheduleEntry>>> {
    let (_, tenant) = ctx.orchestrator.resolve(&login)?;
    let conn = get_conn(&ctx.db)?;
    let today = chrono::Local::now().date_naive();
    Ok(Json(schedules::list_upcoming(&conn, tenant.id, today)?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub playlist_id: PlaylistId,
    pub date: NaiveDate,
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    #[serde(flatten)]
    report: SyncReport,
    schedule: ScheduleEntry,
}

/// POST /api/tenants/:login/schedules
async fn add_schedule(
    State(ctx): State<AppContext>,
    Path(login): Path<String>,
    Json(payload): Json<ScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let new = NewSchedule {
        playlist_id: payload.playlist_id,
        date: payload.date,
        hour: payload.hour,
        minute: payload.minute,
        repeat: payload.repeat,
        shuffle: payload.shuffle,
    };
    let (schedule, report) = ctx.orchestrator.add_schedule(&login, &new).await?;
    Ok((
        StatusCode::CREATED,
        Json(ScheduleResponse { report, schedule }),
    ))
}

/// DELETE /api/tenants/:login/schedules/:schedule_id
async fn remove_schedule(
    State(ctx): State<AppContext>,
    Path((login, schedule_id)): Path<(String, ScheduleId)>,
) -> ApiResult<Json<SyncReport>> {
    Ok(Json(ctx.orchestrator.remove_schedule(&login, schedule_id).await?))
}
