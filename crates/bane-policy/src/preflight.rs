// preflight.rs — Checks that run before any content detection.
//
// Order is fixed and each failure has its own code and enforcement level:
//
//   1. NO_AUTH                  level 2  no authenticated identity
//   2. REPLAY_DETECTED          level 4  nonce seen for this identity within TTL
//   3. IDENTITY_LOCKED          level 4  risk ledger lock still active
//   4. MISSING_CAPABILITY       level 3  required capability not granted
//   5. SESSION_INTEGRITY_FAILED level 3  attestation or payload signature bad
//
// A fresh nonce is recorded at step 2 even if a later step denies, so a
// rejected request cannot be replayed either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity, Verdict};
use crate::input::EvaluationInput;
use crate::integrity::RequestVerifier;
use crate::ledger::RiskLedger;
use crate::nonce::NonceCache;
use crate::profile::PolicyHints;

/// Why preflight refused a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    NoAuth,
    ReplayDetected,
    IdentityLocked,
    MissingCapability,
    SessionIntegrityFailed,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::NoAuth => "NO_AUTH",
            DenialCode::ReplayDetected => "REPLAY_DETECTED",
            DenialCode::IdentityLocked => "IDENTITY_LOCKED",
            DenialCode::MissingCapability => "MISSING_CAPABILITY",
            DenialCode::SessionIntegrityFailed => "SESSION_INTEGRITY_FAILED",
        }
    }

    pub fn enforcement_level(&self) -> u8 {
        match self {
            DenialCode::NoAuth => 2,
            DenialCode::ReplayDetected | DenialCode::IdentityLocked => 4,
            DenialCode::MissingCapability | DenialCode::SessionIntegrityFailed => 3,
        }
    }

    /// Internal finding describing the denial. Never shown to the caller.
    pub fn finding(&self) -> Finding {
        let (title, rationale) = match self {
            DenialCode::NoAuth => (
                "Authentication missing",
                "No authenticated identity was provided.",
            ),
            DenialCode::ReplayDetected => (
                "Replay detected",
                "Request nonce has been seen recently.",
            ),
            DenialCode::IdentityLocked => (
                "Identity temporarily locked",
                "Prior violations triggered an automatic lockout.",
            ),
            DenialCode::MissingCapability => (
                "Insufficient capability",
                "Authenticated identity lacks required capability.",
            ),
            DenialCode::SessionIntegrityFailed => (
                "Session integrity validation failed",
                "Session integrity checks were missing or invalid.",
            ),
        };
        let tags: &[&str] = match self {
            DenialCode::IdentityLocked => &["lockout", "preflight"],
            _ => &["preflight"],
        };
        Finding::new(self.as_str(), title, Severity::High, Verdict::Deny, rationale).with_tags(tags)
    }
}

/// The state preflight reads (and, for nonces, writes).
pub struct Preflight<'a> {
    pub hints: &'a PolicyHints,
    pub ledger: &'a RiskLedger,
    pub nonces: &'a NonceCache,
    pub verifier: Option<&'a dyn RequestVerifier>,
}

impl Preflight<'_> {
    /// `None` to continue into detection, otherwise the first failed check.
    pub fn check(&self, input: &EvaluationInput, now: DateTime<Utc>) -> Option<DenialCode> {
        let Some(auth) = input.auth() else {
            return Some(DenialCode::NoAuth);
        };
        let Some(identity_id) = auth.authenticated_identity() else {
            return Some(DenialCode::NoAuth);
        };

        if let Some(nonce) = auth.nonce.as_deref().filter(|n| !n.is_empty()) {
            if !self.nonces.check_and_insert(identity_id, nonce, now) {
                return Some(DenialCode::ReplayDetected);
            }
        }

        if self.ledger.is_locked(identity_id, now) {
            return Some(DenialCode::IdentityLocked);
        }

        if let Some(required) = input.req.required_capability.as_deref() {
            if !auth.has_capability(required) {
                return Some(DenialCode::MissingCapability);
            }
        }

        if let Some(verifier) = self.verifier {
            let signature_ok = verifier.verify(
                identity_id,
                auth.nonce.as_deref(),
                &input.text,
                auth.signature.as_deref(),
            );
            if !signature_ok {
                return Some(DenialCode::SessionIntegrityFailed);
            }
        }

        if self.hints.strict_mode && !auth.session_integrity.all_ok() {
            return Some(DenialCode::SessionIntegrityFailed);
        }

        None
    }
}
