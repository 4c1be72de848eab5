//! API key authentication and caller role extraction.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use streamctl_common::{Error, Role};

use super::error::AppError;
use crate::context::AppContext;

/// Header through which the calling frontend states on whose behalf it acts.
pub const ROLE_HEADER: &str = "x-streamctl-role";

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn check_api_key(expected: Option<&str>, presented: Option<&str>) -> Result<(), Error> {
    let Some(expected) = expected.filter(|k| !k.is_empty()) else {
        return Ok(());
    };
    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(Error::Unauthorized("invalid API key".into())),
        None => Err(Error::Unauthorized("authentication required".into())),
    }
}

/// Middleware for API key authentication. A no-op when no key is configured.
pub async fn api_auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Err(e) = check_api_key(
        ctx.config.server.api_key.as_deref(),
        bearer_token(request.headers()),
    ) {
        return AppError(e).into_response();
    }
    next.run(request).await
}

/// Caller role from [`ROLE_HEADER`]; absent means a plain tenant.
pub fn caller_role(headers: &HeaderMap) -> Result<Role, Error> {
    let Some(value) = headers.get(ROLE_HEADER) else {
        return Ok(Role::Tenant);
    };
    match value.to_str().unwrap_or_default().trim() {
        "tenant" => Ok(Role::Tenant),
        "reseller" => Ok(Role::Reseller),
        "admin" => Ok(Role::Admin),
        other => Err(Error::Validation(format!("unknown role: {other}"))),
    }
}
