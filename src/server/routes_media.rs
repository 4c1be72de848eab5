//! Media proxy route.
//!
//! Players that cannot set headers pass the tenant token as `?token=`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::auth::bearer_token;
use super::error::ApiResult;
use crate::context::AppContext;

pub fn media_routes() -> Router<AppContext> {
    Router::new().route("/media/:encoded", get(serve_media))
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub token: Option<String>,
}

/// GET /media/:encoded
async fn serve_media(
    State(ctx): State<AppContext>,
    Path(encoded): Path<String>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = bearer_token(&headers).or(query.token.as_deref());
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    Ok(ctx.proxy.serve(token, &encoded, range).await?)
}
