// snapshot.rs — Signed offline policy snapshots.
//
// A snapshot is one identity's roles, entitlements and org constraints,
// frozen at issuance and signed so a disconnected client can authorize
// actions until the snapshot lapses.
//
//   hash = sha256_hex(canonical(unsigned))
//   sig  = base64url_nopad(HMAC-SHA256(key[kid], canonical(unsigned ∪ {hash})))
//
// Canonical form sorts object keys recursively, leaves arrays in order and
// emits no whitespace. Verification hashes the document *as received* (a
// JSON value), so formatting choices of another issuer cannot break it.
// Only `verify_*` can construct a `VerifiedSnapshot`.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bane_audit::hasher::hash_str;

use crate::entitlement::Entitlement;
use crate::error::SnapshotError;

/// The only signature algorithm accepted.
pub const SIGNATURE_ALG: &str = "HS256";

/// Six hours.
pub const DEFAULT_MAX_OFFLINE_SECONDS: i64 = 6 * 60 * 60;

/// Org-wide offline rules. Defaults are the tight ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConstraints {
    pub offline_allowed: bool,
    pub offline_hard_deny_external_hardware: bool,
    pub offline_hard_deny_physical_control: bool,
    pub max_offline_seconds: i64,
}

impl Default for PolicyConstraints {
    fn default() -> Self {
        Self {
            offline_allowed: true,
            offline_hard_deny_external_hardware: true,
            offline_hard_deny_physical_control: true,
            max_offline_seconds: DEFAULT_MAX_OFFLINE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotSignature {
    pub alg: String,
    pub kid: String,
    pub sig: String,
}

/// Everything that is hashed and signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedSnapshot {
    pub uid: String,
    pub org_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub policy_version: u64,
    /// uid → role.
    pub roles: BTreeMap<String, String>,
    /// key → entitlement.
    pub entitlements: BTreeMap<String, Entitlement>,
    pub constraints: PolicyConstraints,
}

impl UnsignedSnapshot {
    /// `min(expires_at, issued_at + max_offline_seconds)`. A window that
    /// overflows the calendar collapses to `issued_at`, so the snapshot is
    /// already expired.
    pub fn effective_expiry(&self) -> DateTime<Utc> {
        let ceiling = Duration::try_seconds(self.constraints.max_offline_seconds)
            .and_then(|window| self.issued_at.checked_add_signed(window))
            .unwrap_or(self.issued_at);
        self.expires_at.min(ceiling)
    }
}

/// A signed snapshot as exported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicySnapshot {
    #[serde(flatten)]
    pub body: UnsignedSnapshot,
    pub hash: String,
    pub signature: SnapshotSignature,
}

/// A snapshot whose hash and signature checked out against the org keyring.
///
/// The offline evaluator only accepts this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSnapshot {
    snapshot: PolicySnapshot,
}

impl VerifiedSnapshot {
    pub fn snapshot(&self) -> &PolicySnapshot {
        &self.snapshot
    }

    /// The verified contents.
    pub fn body(&self) -> &UnsignedSnapshot {
        &self.snapshot.body
    }

    pub fn into_inner(self) -> PolicySnapshot {
        self.snapshot
    }
}

/// Serialize `value` with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // A JSON string always serializes.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of the canonical form of an unsigned snapshot body.
pub fn compute_snapshot_hash(body: &Value) -> String {
    hash_str(&canonical_json(body))
}

fn signing_payload(body: &Value, hash: &str) -> Result<String, SnapshotError> {
    let Value::Object(map) = body else {
        return Err(SnapshotError::MissingField("uid"));
    };
    let mut with_hash: Map<String, Value> = map.clone();
    with_hash.insert("hash".to_string(), Value::String(hash.to_string()));
    Ok(canonical_json(&Value::Object(with_hash)))
}

/// Signs snapshots with one HMAC key.
pub struct SnapshotSigner {
    kid: String,
    key: hmac::Key,
}

impl std::fmt::Debug for SnapshotSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSigner")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl SnapshotSigner {
    pub fn new(kid: impl Into<String>, secret: &[u8]) -> Result<Self, SnapshotError> {
        let kid = kid.into();
        if secret.is_empty() {
            return Err(SnapshotError::EmptySecret { kid });
        }
        Ok(Self {
            kid,
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Hash the body, then sign the canonical JSON of body plus hash.
    pub fn sign(&self, body: UnsignedSnapshot) -> Result<PolicySnapshot, SnapshotError> {
        let value = serde_json::to_value(&body)?;
        let hash = compute_snapshot_hash(&value);
        let payload = signing_payload(&value, &hash)?;
        let tag = hmac::sign(&self.key, payload.as_bytes());
        Ok(PolicySnapshot {
            body,
            hash,
            signature: SnapshotSignature {
                alg: SIGNATURE_ALG.to_string(),
                kid: self.kid.clone(),
                sig: URL_SAFE_NO_PAD.encode(tag.as_ref()),
            },
        })
    }
}

/// Snapshot verification keys, per org and key id.
#[derive(Default)]
pub struct SnapshotKeyring {
    keys: HashMap<String, HashMap<String, hmac::Key>>,
}

impl std::fmt::Debug for SnapshotKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kids: BTreeMap<&String, Vec<&String>> = self
            .keys
            .iter()
            .map(|(org, keys)| (org, keys.keys().collect()))
            .collect();
        f.debug_struct("SnapshotKeyring").field("kids", &kids).finish()
    }
}

impl SnapshotKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verification key for `org_id`. Empty secrets are refused.
    pub fn insert(
        &mut self,
        org_id: impl Into<String>,
        kid: impl Into<String>,
        secret: &[u8],
    ) -> Result<(), SnapshotError> {
        let kid = kid.into();
        if secret.is_empty() {
            return Err(SnapshotError::EmptySecret { kid });
        }
        self.keys
            .entry(org_id.into())
            .or_default()
            .insert(kid, hmac::Key::new(hmac::HMAC_SHA256, secret));
        Ok(())
    }

    /// Drop a key so snapshots signed with it stop verifying.
    pub fn remove(&mut self, org_id: &str, kid: &str) -> bool {
        self.keys
            .get_mut(org_id)
            .is_some_and(|keys| keys.remove(kid).is_some())
    }

    fn key(&self, org_id: &str, kid: &str) -> Option<&hmac::Key> {
        self.keys.get(org_id).and_then(|keys| keys.get(kid))
    }

    /// Verify a typed snapshot.
    pub fn verify(&self, snapshot: &PolicySnapshot) -> Result<VerifiedSnapshot, SnapshotError> {
        self.verify_value(serde_json::to_value(snapshot)?)
    }

    /// Verify a snapshot document exactly as received.
    pub fn verify_str(&self, json: &str) -> Result<VerifiedSnapshot, SnapshotError> {
        self.verify_value(serde_json::from_str(json)?)
    }

    /// Verify a snapshot document as a JSON value.
    ///
    /// Checks, in order: algorithm, key id known for the org, hash of the
    /// body, then the HMAC in constant time.
    pub fn verify_value(&self, document: Value) -> Result<VerifiedSnapshot, SnapshotError> {
        let Value::Object(mut body) = document else {
            return Err(SnapshotError::MissingField("hash"));
        };
        let hash = match body.remove("hash") {
            Some(Value::String(hash)) => hash,
            _ => return Err(SnapshotError::MissingField("hash")),
        };
        let signature: SnapshotSignature = match body.remove("signature") {
            Some(sig) => serde_json::from_value(sig)?,
            None => return Err(SnapshotError::MissingField("signature")),
        };
        let org_id = match body.get("orgId") {
            Some(Value::String(org)) => org.clone(),
            _ => return Err(SnapshotError::MissingField("orgId")),
        };

        if signature.alg != SIGNATURE_ALG {
            return Err(SnapshotError::UnsupportedAlgorithm(signature.alg));
        }
        let key = self
            .key(&org_id, &signature.kid)
            .ok_or_else(|| SnapshotError::UnknownKey {
                org_id: org_id.clone(),
                kid: signature.kid.clone(),
            })?;

        let body = Value::Object(body);
        if compute_snapshot_hash(&body) != hash {
            return Err(SnapshotError::HashMismatch);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(signature.sig.as_bytes())
            .map_err(|_| SnapshotError::BadSignature)?;
        let payload = signing_payload(&body, &hash)?;
        hmac::verify(key, payload.as_bytes(), &tag).map_err(|_| SnapshotError::BadSignature)?;

        let body: UnsignedSnapshot = serde_json::from_value(body)?;
        Ok(VerifiedSnapshot {
            snapshot: PolicySnapshot {
                body,
                hash,
                signature,
            },
        })
    }
}
