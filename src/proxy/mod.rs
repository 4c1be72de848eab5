//! Media proxy: serves byte ranges of remote files to HTTP clients.
//!
//! The only access rule is that the decoded path lies under the
//! authenticated tenant's root. Bytes are streamed from a remote read
//! process (or a local cached copy) straight into the response body.

pub mod cache;
pub mod path;
pub mod range;
pub mod registry;
pub mod token;

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use streamctl_common::{Error, Result};
use streamctl_db::pool::{get_conn, DbPool};
use streamctl_db::queries::{servers, tenants};
use streamctl_remote::{shell, ConnectionManager, HostSpec, Layout};
use tokio::io::{AsyncRead, AsyncSeekExt};
use tokio_util::io::ReaderStream;

pub use cache::MediaCache;
pub use path::{decode_path, encode_path};
pub use range::{parse_range_header, ReadPlan};
pub use registry::{ActiveStream, StreamGuard, StreamRegistry};
pub use token::TokenSigner;

use crate::config::ProxyConfig;

const CHUNK: usize = 64 * 1024;

/// Guess the MIME type from the file extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "ts" => "video/mp2t",
        "mov" => "video/quicktime",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

pub struct MediaProxy {
    db: DbPool,
    manager: Arc<ConnectionManager>,
    layout: Layout,
    signer: Option<TokenSigner>,
    plan: ReadPlan,
    cache: Option<MediaCache>,
    registry: Arc<StreamRegistry>,
}

impl MediaProxy {
    pub fn new(
        db: DbPool,
        manager: Arc<ConnectionManager>,
        layout: Layout,
        config: &ProxyConfig,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        Self {
            db,
            manager,
            layout,
            signer: config
                .token_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(TokenSigner::new),
            plan: ReadPlan {
                large_file_threshold: config.large_file_threshold,
                block_size: config.block_size,
            },
            cache: config
                .cache_enabled
                .then(|| MediaCache::new(config.cache_dir.clone())),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn signer(&self) -> Option<&TokenSigner> {
        self.signer.as_ref()
    }

    /// Serve `encoded_path` to the holder of `token`.
    pub async fn serve(
        &self,
        token: Option<&str>,
        encoded_path: &str,
        range_header: Option<&str>,
    ) -> Result<Response> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::Unauthorized("media proxy has no token secret".into()))?;
        let token = token.ok_or_else(|| Error::Unauthorized("missing bearer token".into()))?;
        let login = signer.verify(token)?;
        let remote_path = decode_path(encoded_path)?;

        let root = self.layout.tenant_root(&login);
        if !shell::is_within(&root, &remote_path) {
            tracing::warn!(login = %login, path = %remote_path, "Media path outside tenant root");
            return Err(Error::Forbidden("path is outside the tenant root".into()));
        }

        let server = {
            let conn = get_conn(&self.db)?;
            let tenant = tenants::get_tenant_by_login(&conn, &login)?
                .ok_or_else(|| Error::Unauthorized("unknown tenant".into()))?;
            servers::get_server(&conn, tenant.server_id)?
                .ok_or_else(|| Error::not_found("server", tenant.server_id))?
        };
        let host = HostSpec::from(&server);

        let stat = self.manager.stat(&host, &remote_path).await?;
        if !stat.exists {
            return Err(Error::not_found("file", &remote_path));
        }

        let content_type = guess_content_type(&remote_path);

        if let Some(cache) = &self.cache {
            let local = cache
                .fetch(&self.manager, &host, &remote_path, &stat)
                .await?;
            return serve_local(&local, content_type, range_header).await;
        }

        let range = match range_header {
            Some(h) => match parse_range_header(h, stat.size) {
                Some(r) => Some(r),
                None => return Ok(not_satisfiable(stat.size)),
            },
            None => None,
        };

        let script = self.plan.script(&remote_path, stat.size, range);
        let reader = self.manager.open_read(&host, &script).await?;
        let guard = self.registry.register(&login, &remote_path);
        tracing::debug!(login = %login, path = %remote_path, ?range, "Proxying remote read");

        Ok(build_response(
            reader,
            guard,
            content_type,
            stat.size,
            range,
            remote_path,
        ))
    }
}

fn not_satisfiable(size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        Body::empty(),
    )
        .into_response()
}

/// Wrap a reader in a streaming body that stops on cancellation and logs
/// mid-stream failures. Headers are already sent by then, so errors only
/// end the body.
fn stream_body<R>(reader: R, guard: Option<StreamGuard>, path: String) -> Body
where
    R: AsyncRead + Send + 'static,
{
    let cancelled = match &guard {
        Some(g) => g.token(),
        None => tokio_util::sync::CancellationToken::new(),
    };
    let stream = ReaderStream::with_capacity(reader, CHUNK)
        .take_until(cancelled.cancelled_owned())
        .inspect_err(move |e| {
            tracing::warn!(path = %path, "Media stream aborted: {e}");
        })
        .map(move |chunk| {
            let _keep = &guard;
            chunk
        });
    Body::from_stream(stream)
}

fn range_headers(
    content_type: &str,
    size: u64,
    range: Option<(u64, u64)>,
) -> (StatusCode, Vec<(header::HeaderName, String)>) {
    let mut headers = vec![
        (header::CONTENT_TYPE, content_type.to_string()),
        (header::ACCEPT_RANGES, "bytes".to_string()),
    ];
    match range {
        Some((start, end)) => {
            headers.push((header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")));
            headers.push((header::CONTENT_LENGTH, (end - start + 1).to_string()));
            (StatusCode::PARTIAL_CONTENT, headers)
        }
        None => {
            headers.push((header::CONTENT_LENGTH, size.to_string()));
            (StatusCode::OK, headers)
        }
    }
}

fn build_response<R>(
    reader: R,
    guard: StreamGuard,
    content_type: &str,
    size: u64,
    range: Option<(u64, u64)>,
    path: String,
) -> Response
where
    R: AsyncRead + Send + 'static,
{
    let (status, headers) = range_headers(content_type, size, range);
    let mut response = Response::new(stream_body(reader, Some(guard), path));
    *response.status_mut() = status;
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Serve a cached copy. Ranges are resolved against the copy's own size.
async fn serve_local(
    local: &Path,
    content_type: &str,
    range_header: Option<&str>,
) -> Result<Response> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(local).await?;
    let size = file.metadata().await?.len();
    let range = match range_header {
        Some(h) => match parse_range_header(h, size) {
            Some(r) => Some(r),
            None => return Ok(not_satisfiable(size)),
        },
        None => None,
    };
    let (status, headers) = range_headers(content_type, size, range);

    let body = match range {
        Some((start, end)) => {
            file.seek(std::io::SeekFrom::Start(start)).await?;
            stream_body(file.take(end - start + 1), None, local.display().to_string())
        }
        None => stream_body(file, None, local.display().to_string()),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(guess_content_type("/a/b.MP4"), "video/mp4");
        assert_eq!(guess_content_type("/a/b.mkv"), "video/x-matroska");
        assert_eq!(guess_content_type("/a/noext"), "application/octet-stream");
    }

    #[test]
    fn partial_headers() {
        let (status, headers) = range_headers("video/mp4", 1000, Some((0, 99)));
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert!(headers.contains(&(header::CONTENT_RANGE, "bytes 0-99/1000".to_string())));
        assert!(headers.contains(&(header::CONTENT_LENGTH, "100".to_string())));
    }

    #[test]
    fn full_headers() {
        let (status, headers) = range_headers("video/mp4", 1000, None);
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains(&(header::CONTENT_LENGTH, "1000".to_string())));
        assert!(headers.contains(&(header::ACCEPT_RANGES, "bytes".to_string())));
    }
}
