// error.rs — Error types for entitlements and policy snapshots.
//
// An entitlement *denial* is an EntitlementDecision, not an error. These
// variants cover refused administrative actions and snapshots that cannot be
// built or trusted. A snapshot error is never interpreted as allow.

use thiserror::Error;

/// Errors from snapshot signing and verification.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// HMAC secrets must be non-empty.
    #[error("snapshot signing secret for kid '{kid}' is empty")]
    EmptySecret { kid: String },

    /// No key with this id is registered for the snapshot's org.
    #[error("no snapshot key '{kid}' registered for org '{org_id}'")]
    UnknownKey { org_id: String, kid: String },

    /// Only HS256 is accepted.
    #[error("unsupported snapshot signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// The recomputed hash differs from the embedded one.
    #[error("snapshot hash mismatch")]
    HashMismatch,

    /// The signature is malformed or does not match.
    #[error("snapshot signature verification failed")]
    BadSignature,

    /// The document is not a signed snapshot.
    #[error("snapshot is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from administrative entitlement operations.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The actor is not an administrator of the org.
    #[error("'{actor_id}' is not an administrator of org '{org_id}'")]
    NotOrgAdmin { org_id: String, actor_id: String },

    /// Snapshot issuance needs the subject to be a member of the org.
    #[error("'{uid}' has no role in org '{org_id}'")]
    NoRole { org_id: String, uid: String },

    /// Entitlement lifetime must be between one day and
    /// `MAX_ENTITLEMENT_DAYS`.
    #[error("entitlement duration must be between 1 and 3650 days, got {days}")]
    InvalidDuration { days: i64 },

    /// The org's offline window does not fit on the calendar.
    #[error("offline window of {seconds} seconds is out of range")]
    InvalidOfflineWindow { seconds: i64 },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
