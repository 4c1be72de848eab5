//! Stateless HTTP probe against a tenant's low-latency playback URL.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use streamctl_db::models::Server;

use crate::config::IngestConfig;
use crate::template::TemplateContext;

/// What the playback URL says about the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    /// 200: a source is publishing.
    Live,
    /// 404: the application answers but nothing is publishing.
    LoadedNoSource,
    /// Anything else, including connection failures.
    NotLoaded,
}

impl IngestState {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Self::Live,
            StatusCode::NOT_FOUND => Self::LoadedNoSource,
            _ => Self::NotLoaded,
        }
    }

    /// Whether the probe shows the application as loaded.
    pub fn is_loaded(self) -> bool {
        !matches!(self, Self::NotLoaded)
    }
}

pub struct IngestProbe {
    client: Client,
    url_template: String,
}

impl IngestProbe {
    pub fn new(config: &IngestConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });
        Self {
            client,
            url_template: config.probe_url_template.clone(),
        }
    }

    pub fn url(&self, server: &Server, login: &str) -> String {
        TemplateContext::new()
            .with_var("host", server.host.as_str())
            .with_var("port", server.http_port.to_string())
            .with_var("login", login)
            .substitute_url(&self.url_template)
    }

    pub async fn probe(&self, server: &Server, login: &str) -> IngestState {
        let url = self.url(server, login);
        match self.client.head(&url).send().await {
            Ok(resp) => IngestState::from_status(resp.status()),
            Err(e) => {
                tracing::debug!(login, url = %url, "Ingest probe failed: {e}");
                IngestState::NotLoaded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamctl_common::{ServerId, ServerStatus};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(mock: &MockServer) -> Server {
        Server {
            id: ServerId::new(),
            name: "edge-1".into(),
            host: mock.address().ip().to_string(),
            ssh_port: 22,
            ssh_user: "root".into(),
            ssh_password: None,
            ssh_key_path: None,
            http_port: mock.address().port(),
            max_tenants: 10,
            current_tenants: 0,
            status: ServerStatus::Active,
            created_at: "now".into(),
        }
    }

    #[test]
    fn classification() {
        assert_eq!(IngestState::from_status(StatusCode::OK), IngestState::Live);
        assert_eq!(
            IngestState::from_status(StatusCode::NOT_FOUND),
            IngestState::LoadedNoSource
        );
        assert_eq!(
            IngestState::from_status(StatusCode::SERVICE_UNAVAILABLE),
            IngestState::NotLoaded
        );
    }

    #[tokio::test]
    async fn probes_playlist_url() {
        let mock = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/radio1/radio1_ll/playlist.m3u8"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let probe = IngestProbe::new(&IngestConfig::default());
        let server = server_for(&mock);
        assert_eq!(probe.probe(&server, "radio1").await, IngestState::Live);
        assert_eq!(probe.probe(&server, "radio2").await, IngestState::LoadedNoSource);
    }
}
