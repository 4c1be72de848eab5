//! Domain enums shared across crates.
//!
//! All enums serialize in snake_case and implement `Display`/`FromStr` with
//! the same spelling, which is also how they are stored in the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational status of a media-serving host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Active,
    Maintenance,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(format!("unknown server status: {other}")),
        }
    }
}

/// State of a tenant's application instance on the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Unloaded,
    Loaded,
    Blocked,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loaded => write!(f, "loaded"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Freshness of a tenant's generated playlist document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigState {
    NoConfig,
    Generated,
    Stale,
}

impl fmt::Display for ConfigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConfig => write!(f, "no_config"),
            Self::Generated => write!(f, "generated"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Status of a transmission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionStatus {
    Active,
    Ended,
}

impl fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

impl FromStr for TransmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown transmission status: {other}")),
        }
    }
}

/// Caller role for privileged lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Reseller,
    Admin,
}

impl Role {
    /// Whether this role may block or unblock an application.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Reseller | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_round_trip() {
        for status in [ServerStatus::Active, ServerStatus::Maintenance] {
            assert_eq!(status.to_string().parse::<ServerStatus>().unwrap(), status);
        }
        assert!("broken".parse::<ServerStatus>().is_err());
    }

    #[test]
    fn instance_state_serializes_snake_case() {
        let json = serde_json::to_string(&InstanceState::Unloaded).unwrap();
        assert_eq!(json, "\"unloaded\"");
    }

    #[test]
    fn privileged_roles() {
        assert!(Role::Admin.is_privileged());
        assert!(Role::Reseller.is_privileged());
        assert!(!Role::Tenant.is_privileged());
    }
}
