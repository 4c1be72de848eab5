//! Unified error type for streamctl.
//!
//! The variants follow the orchestration failure taxonomy: transport failures
//! are either transient (retried) or fatal (surfaced immediately), remote state
//! mismatches trigger repair provisioning, config generation problems are
//! downgraded to warnings by callers, and lifecycle errors are surfaced as-is
//! because they are the requested action.

use std::fmt;

/// Unified error type covering all failure modes in streamctl.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "tenant", "folder").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks permission for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists, or a precondition does not hold.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Timeout, connection reset or refused. Safe to retry.
    #[error("Transient transport error [{server}]: {message}")]
    TransientTransport {
        /// Host the failure was observed against.
        server: String,
        /// Human-readable error description.
        message: String,
    },

    /// Credentials rejected by the remote host. Never retried.
    #[error("Authentication failed [{server}]: {message}")]
    FatalAuth {
        /// Host the failure was observed against.
        server: String,
        /// Human-readable error description.
        message: String,
    },

    /// The owning server is in maintenance mode. Never retried.
    #[error("Server {server} is in maintenance")]
    Maintenance {
        /// Host in maintenance.
        server: String,
    },

    /// The remote filesystem does not match what the store expects.
    #[error("Remote state mismatch: {0}")]
    RemoteStateMismatch(String),

    /// The generated playlist document could not be produced or written.
    #[error("Config generation failed: {0}")]
    ConfigGeneration(String),

    /// A lifecycle command against the media engine failed.
    #[error("Lifecycle command '{action}' failed: {message}")]
    Lifecycle {
        /// The lifecycle action (start, stop, ...).
        action: String,
        /// Human-readable error description.
        message: String,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::TransientTransport { .. } => 503,
            Error::FatalAuth { .. } => 502,
            Error::Maintenance { .. } => 503,
            Error::RemoteStateMismatch(_) => 409,
            Error::ConfigGeneration(_) => 500,
            Error::Lifecycle { .. } => 502,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::TransientTransport { .. } => "transport_unavailable",
            Error::FatalAuth { .. } => "transport_auth_failed",
            Error::Maintenance { .. } => "server_maintenance",
            Error::RemoteStateMismatch(_) => "remote_state_mismatch",
            Error::ConfigGeneration(_) => "config_generation_failed",
            Error::Lifecycle { .. } => "lifecycle_failed",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether the operation that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientTransport { .. })
    }

    /// Whether this error must never be retried and should surface immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalAuth { .. } | Error::Maintenance { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::TransientTransport`].
    pub fn transient(server: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TransientTransport {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::FatalAuth`].
    pub fn fatal_auth(server: impl Into<String>, message: impl Into<String>) -> Self {
        Error::FatalAuth {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Lifecycle`].
    pub fn lifecycle(action: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Lifecycle {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("tenant", "radio1");
        assert_eq!(err.to_string(), "tenant not found: radio1");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn transient_is_retryable() {
        let err = Error::transient("edge-1", "connection reset");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Transient transport error [edge-1]: connection reset"
        );
    }

    #[test]
    fn fatal_errors_never_retry() {
        let auth = Error::fatal_auth("edge-1", "Permission denied");
        assert!(auth.is_fatal());
        assert!(!auth.is_retryable());

        let maint = Error::Maintenance {
            server: "edge-1".into(),
        };
        assert!(maint.is_fatal());
        assert!(!maint.is_retryable());
        assert_eq!(maint.http_status(), 503);
    }

    #[test]
    fn lifecycle_display() {
        let err = Error::lifecycle("start", "exit status 1");
        assert_eq!(
            err.to_string(),
            "Lifecycle command 'start' failed: exit status 1"
        );
        assert_eq!(err.code(), "lifecycle_failed");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn mismatch_is_not_retryable() {
        let err = Error::RemoteStateMismatch("folder missing".into());
        assert!(!err.is_retryable());
        assert_eq!(err.http_status(), 409);
    }
}
