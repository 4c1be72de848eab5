//! Hot-reload of a tenant's schedule through the engine's HTTP endpoint.
//!
//! The endpoint answers 200 both when the reload finished and while it is
//! still in progress, so success is decided by a sentinel string in the
//! body, never by the status code alone.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use streamctl_common::{Error, Result};
use streamctl_db::models::Server;
use streamctl_remote::retry::retry_if;
use streamctl_remote::RetryPolicy;

use super::digest::DigestChallenge;
use crate::config::ReloadConfig;
use crate::template::TemplateContext;

/// A completed reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutcome {
    pub attempts: u32,
    /// The document was rebuilt before the reload was sent.
    pub regenerated: bool,
}

#[derive(Debug)]
enum AttemptError {
    /// The endpoint answered but the sentinel was absent.
    NotDone(String),
    /// Connection failure, timeout or a 5xx.
    Transport(String),
    /// Credentials refused after the digest handshake.
    Rejected(StatusCode),
    /// Any other unexpected answer.
    Unexpected(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDone(body) => write!(f, "reload not confirmed: {body}"),
            Self::Transport(msg) => write!(f, "{msg}"),
            Self::Rejected(status) => write!(f, "credentials rejected ({status})"),
            Self::Unexpected(msg) => write!(f, "{msg}"),
        }
    }
}

pub struct ReloadClient {
    client: Client,
    config: ReloadConfig,
}

impl ReloadClient {
    pub fn new(config: ReloadConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });
        Self { client, config }
    }

    /// Reload URL for a tenant on `server`.
    pub fn url(&self, server: &Server, login: &str) -> String {
        TemplateContext::new()
            .with_var("host", server.host.as_str())
            .with_var("port", server.http_port.to_string())
            .with_var("login", login)
            .substitute_url(&self.config.url_template)
    }

    /// Ask the engine to re-read the tenant's schedule document.
    ///
    /// Makes at most `max_attempts` authorized requests. Rejected credentials
    /// end the loop immediately.
    pub async fn reload(&self, server: &Server, login: &str) -> Result<ReloadOutcome> {
        let url = self.url(server, login);
        let policy = RetryPolicy::new(
            self.config.max_attempts,
            Duration::from_millis(self.config.delay_ms),
        );
        let attempts = &AtomicU32::new(0);
        let url_ref = url.as_str();

        let result = retry_if(
            policy,
            "schedule reload",
            |e: &AttemptError| matches!(e, AttemptError::NotDone(_) | AttemptError::Transport(_)),
            || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.attempt(url_ref).await
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(()) => {
                tracing::info!(server = %server.name, login, attempts, "Schedule reloaded");
                Ok(ReloadOutcome {
                    attempts,
                    regenerated: false,
                })
            }
            Err(AttemptError::Rejected(status)) => Err(Error::fatal_auth(
                &server.name,
                format!("reload endpoint rejected credentials ({status})"),
            )),
            Err(e) => Err(Error::lifecycle(
                "reload",
                format!("{e} after {attempts} attempt(s)"),
            )),
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<(), AttemptError> {
        let first = self.client.get(url).send().await.map_err(transport)?;

        let response = if first.status() == StatusCode::UNAUTHORIZED {
            let challenge = first
                .headers()
                .get_all(WWW_AUTHENTICATE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .find_map(DigestChallenge::parse)
                .ok_or_else(|| {
                    AttemptError::Unexpected("401 without a digest challenge".into())
                })?;
            let uri = request_uri(url);
            let header = challenge.authorization(
                &self.config.username,
                &self.config.password,
                "GET",
                &uri,
            );
            let second = self
                .client
                .get(url)
                .header(AUTHORIZATION, header)
                .send()
                .await
                .map_err(transport)?;
            if matches!(second.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(AttemptError::Rejected(second.status()));
            }
            second
        } else {
            first
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Transport(format!("reload endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Unexpected(format!(
                "reload endpoint returned {status}"
            )));
        }

        let body = response.text().await.map_err(transport)?;
        if body.contains(&self.config.sentinel) {
            Ok(())
        } else {
            Err(AttemptError::NotDone(snippet(&body)))
        }
    }
}

fn transport(e: reqwest::Error) -> AttemptError {
    AttemptError::Transport(e.to_string())
}

/// Path and query of `url`, the `uri` the digest covers.
fn request_uri(url: &str) -> String {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match after_scheme.find('/') {
        Some(i) => after_scheme[i..].to_string(),
        None => "/".to_string(),
    }
}

fn snippet(body: &str) -> String {
    let line = body.trim().lines().next().unwrap_or("");
    line.chars().take(120).collect()
}
