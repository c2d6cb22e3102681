//! Offline identity snapshot
//!
//! A successful online sign-in is persisted as a versioned binary snapshot
//! so the user can keep working when the identity provider is unreachable.
//! Restoration is deliberately fail-open: a missing or unreadable snapshot
//! yields the anonymous identity instead of an error, so a damaged blob can
//! never block application startup.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Version byte prefixed to the serialized snapshot. Bump on any change to
/// the `StoredIdentity` layout; older or unknown versions restore as corrupt.
pub const IDENTITY_FORMAT_VERSION: u8 = 1;

/// Claim kind used for role membership
pub const ROLE_CLAIM: &str = "role";

/// A single claim attached to an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Snapshot of the last known authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    /// How the identity was established (e.g. "oidc"); `None` means anonymous
    pub authentication_type: Option<String>,
    /// Display name, if the provider supplied one
    pub name: Option<String>,
    pub claims: Vec<Claim>,
}

impl StoredIdentity {
    /// The unauthenticated identity returned when no usable snapshot exists
    pub fn anonymous() -> Self {
        Self {
            authentication_type: None,
            name: None,
            claims: Vec::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_type.is_some()
    }

    /// Values of all role claims
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.claims
            .iter()
            .filter(|c| c.kind == ROLE_CLAIM)
            .map(|c| c.value.as_str())
    }

    /// Encode as the versioned binary form stored under `claims_principal`
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let body = postcard::to_allocvec(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(1 + body.len());
        bytes.push(IDENTITY_FORMAT_VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}

/// Outcome of restoring a persisted identity snapshot
///
/// "Absent" and "Corrupt" are distinct states even though the public load
/// operation collapses both into the anonymous identity; keeping them apart
/// makes the fail-open policy a named, testable behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityRestore {
    Valid(StoredIdentity),
    Absent,
    Corrupt,
}

impl IdentityRestore {
    /// Decode a persisted blob, if any
    pub fn from_blob(blob: Option<&[u8]>) -> Self {
        let bytes = match blob {
            Some(bytes) => bytes,
            None => return IdentityRestore::Absent,
        };

        match bytes.split_first() {
            Some((&IDENTITY_FORMAT_VERSION, body)) => match postcard::from_bytes(body) {
                Ok(identity) => IdentityRestore::Valid(identity),
                Err(e) => {
                    warn!(error = %e, "Stored identity snapshot is unreadable");
                    IdentityRestore::Corrupt
                }
            },
            Some((&version, _)) => {
                warn!(version, "Stored identity snapshot has an unknown format version");
                IdentityRestore::Corrupt
            }
            None => {
                warn!("Stored identity snapshot is empty");
                IdentityRestore::Corrupt
            }
        }
    }

    /// Collapse to an identity: Absent and Corrupt both become anonymous
    pub fn or_anonymous(self) -> StoredIdentity {
        match self {
            IdentityRestore::Valid(identity) => identity,
            IdentityRestore::Absent | IdentityRestore::Corrupt => StoredIdentity::anonymous(),
        }
    }
}
