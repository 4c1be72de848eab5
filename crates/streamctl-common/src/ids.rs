//! Identifiers for stored records.
//!
//! Every record kind gets its own UUID newtype so a tenant id cannot be
//! handed to a playlist query. Ids travel as hyphenated text: in JSON, in
//! URL path segments and in the SQLite `TEXT` key columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! record_ids {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Fresh random (v4) id for a record about to be inserted.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0.hyphenated(), f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    s.trim().parse::<Uuid>().map(Self)
                }
            }

            // Row decoding parses the stored text once and wraps it.
            impl From<Uuid> for $name {
                fn from(raw: Uuid) -> Self {
                    Self(raw)
                }
            }
        )+
    };
}

record_ids! {
    /// A media engine host.
    ServerId;
    /// A streaming account.
    TenantId;
    FolderId;
    VideoId;
    PlaylistId;
    /// One dated slot in a tenant's schedule.
    ScheduleId;
    /// A live or historical transmission.
    TransmissionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_differ() {
        assert_ne!(ServerId::new(), ServerId::new());
    }

    #[test]
    fn text_form_parses_back() {
        let id = TenantId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.parse::<TenantId>().unwrap(), id);
        assert_eq!(format!(" {text}\n").parse::<TenantId>().unwrap(), id);
    }

    #[test]
    fn json_form_is_a_bare_string() {
        let id = FolderId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PlaylistId::from_str("not-a-uuid").is_err());
    }
}
