// registry.rs — In-memory entitlement registry: issue, renew, revoke, and
// policy snapshot issuance.
//
// All state for one registry lives behind a single mutex, so a mutation and
// its policy version bump are atomic. Entitlements are never removed: revoke
// is a status change. Every mutation appends an event with before/after state
// through the AuditSink, after the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use bane_audit::{AuditSink, EventKind, EventRecord};

use crate::catalog::KeyCatalog;
use crate::entitlement::{entitlement_id, Entitlement, EntitlementStatus, Stage};
use crate::error::EntitlementError;
use crate::snapshot::{PolicyConstraints, PolicySnapshot, SnapshotSigner, UnsignedSnapshot};

/// Lifetime of an issue or renewal when the request names none.
pub const DEFAULT_ENTITLEMENT_DAYS: i64 = 30;
/// Longest lifetime a single issue or renewal may grant (ten years).
pub const MAX_ENTITLEMENT_DAYS: i64 = 3650;
/// Recorded when a revoke request gives no reason.
pub const DEFAULT_REVOKE_REASON: &str = "admin_revoke";

/// Roles allowed to issue and revoke.
const ADMIN_ROLES: &[&str] = &["admin", "owner"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueRequest {
    pub org_id: String,
    pub target_uid: String,
    pub key: String,
    pub stage: Option<Stage>,
    pub days: Option<i64>,
    pub seat_bound: bool,
    pub device_bound: bool,
    pub allowed_device_ids: Vec<String>,
    pub caps: Option<Vec<String>>,
}

impl IssueRequest {
    pub fn new(org_id: impl Into<String>, target_uid: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            target_uid: target_uid.into(),
            key: key.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RevokeRequest {
    pub org_id: String,
    pub target_uid: String,
    pub key: String,
    pub reason: Option<String>,
}

/// Result of an issue or revoke.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MutationReceipt {
    pub entitlement_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub already_missing: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// org → uid → role
    members: HashMap<String, BTreeMap<String, String>>,
    /// org → entitlement id → entitlement
    entitlements: HashMap<String, BTreeMap<String, Entitlement>>,
    constraints: HashMap<String, PolicyConstraints>,
}

/// Org memberships, entitlements and offline constraints, with every
/// mutation recorded through an [`AuditSink`].
pub struct EntitlementRegistry {
    catalog: KeyCatalog,
    state: Mutex<RegistryState>,
    sink: AuditSink,
}

impl Default for EntitlementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementRegistry {
    pub fn new() -> Self {
        Self {
            catalog: KeyCatalog::new(),
            state: Mutex::new(RegistryState::default()),
            sink: AuditSink::disabled(),
        }
    }

    /// Per-key defaults for stage and caps at issue time.
    pub fn with_catalog(mut self, catalog: KeyCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Where issue, renew, revoke and snapshot events go.
    pub fn with_sink(mut self, sink: AuditSink) -> Self {
        self.sink = sink;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add `uid` to the org or change its role.
    pub fn set_member(&self, org_id: &str, uid: &str, role: &str) {
        self.lock()
            .members
            .entry(org_id.to_string())
            .or_default()
            .insert(uid.to_string(), role.to_string());
    }

    pub fn remove_member(&self, org_id: &str, uid: &str) -> bool {
        self.lock()
            .members
            .get_mut(org_id)
            .and_then(|m| m.remove(uid))
            .is_some()
    }

    /// The member's role, if any.
    pub fn role_of(&self, org_id: &str, uid: &str) -> Option<String> {
        self.lock().members.get(org_id)?.get(uid).cloned()
    }

    /// Whether `uid` holds the admin or owner role.
    pub fn is_org_admin(&self, org_id: &str, uid: &str) -> bool {
        self.role_of(org_id, uid)
            .map(|r| ADMIN_ROLES.contains(&r.as_str()))
            .unwrap_or(false)
    }

    /// Override the tight default constraints for one org's snapshots.
    pub fn set_constraints(&self, org_id: &str, constraints: PolicyConstraints) {
        self.lock().constraints.insert(org_id.to_string(), constraints);
    }

    /// The org's offline constraints, or the defaults.
    pub fn constraints_for(&self, org_id: &str) -> PolicyConstraints {
        self.lock()
            .constraints
            .get(org_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, org_id: &str, uid: &str, key: &str) -> Option<Entitlement> {
        self.lock()
            .entitlements
            .get(org_id)?
            .get(&entitlement_id(uid, key))
            .cloned()
    }

    /// Every entitlement `uid` holds in `org_id`, revoked ones included.
    pub fn entitlements_for(&self, org_id: &str, uid: &str) -> Vec<Entitlement> {
        self.lock()
            .entitlements
            .get(org_id)
            .map(|ents| ents.values().filter(|e| e.uid == uid).cloned().collect())
            .unwrap_or_default()
    }

    fn require_admin(&self, org_id: &str, actor_id: &str) -> Result<(), EntitlementError> {
        if self.is_org_admin(org_id, actor_id) {
            Ok(())
        } else {
            Err(EntitlementError::NotOrgAdmin {
                org_id: org_id.to_string(),
                actor_id: actor_id.to_string(),
            })
        }
    }

    /// Create or renew an entitlement. Renewal resets status to active and
    /// restarts the lifetime from `now`.
    pub fn issue(
        &self,
        actor_id: &str,
        request: &IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<MutationReceipt, EntitlementError> {
        self.require_admin(&request.org_id, actor_id)?;
        let days = request.days.unwrap_or(DEFAULT_ENTITLEMENT_DAYS);
        if !(1..=MAX_ENTITLEMENT_DAYS).contains(&days) {
            return Err(EntitlementError::InvalidDuration { days });
        }
        let expires_at = Duration::try_days(days)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or(EntitlementError::InvalidDuration { days })?;

        let defaults = self.catalog.defaults_for(&request.key);
        let ent_id = entitlement_id(&request.target_uid, &request.key);

        let (before, next) = {
            let mut state = self.lock();
            let org = state.entitlements.entry(request.org_id.clone()).or_default();
            let prev = org.get(&ent_id);
            let before = prev.map(lifecycle_view);
            let next = Entitlement {
                uid: request.target_uid.clone(),
                org_id: Some(request.org_id.clone()),
                key: request.key.clone(),
                stage: request.stage.unwrap_or(defaults.stage),
                status: EntitlementStatus::Active,
                issued_at: now,
                expires_at,
                grace_until: None,
                seat_bound: request.seat_bound,
                device_bound: request.device_bound,
                allowed_device_ids: request.allowed_device_ids.clone(),
                caps: request.caps.clone().unwrap_or(defaults.caps),
                policy_version: prev.map(|p| p.policy_version).unwrap_or(0) + 1,
                updated_at: now,
                revoke_reason: None,
            };
            org.insert(ent_id.clone(), next.clone());
            (before, next)
        };

        let kind = if before.is_some() {
            EventKind::EntitlementRenew
        } else {
            EventKind::EntitlementIssue
        };
        tracing::info!(
            org_id = %request.org_id,
            actor_id = %actor_id,
            entitlement_id = %ent_id,
            policy_version = next.policy_version,
            renewed = before.is_some(),
            "entitlement issued"
        );

        let mut event = EventRecord::new(kind)
            .at(now)
            .with_org(&request.org_id)
            .with_actor(actor_id)
            .with_target(&request.target_uid)
            .with_after(lifecycle_view(&next));
        if let Some(before) = before {
            event = event.with_before(before);
        }
        self.sink.record_event(event);

        Ok(MutationReceipt {
            entitlement_id: ent_id,
            policy_version: Some(next.policy_version),
            already_missing: false,
        })
    }

    /// Revoke an entitlement. Revoking one that was never issued is not an
    /// error; the receipt reports `already_missing`.
    pub fn revoke(
        &self,
        actor_id: &str,
        request: &RevokeRequest,
        now: DateTime<Utc>,
    ) -> Result<MutationReceipt, EntitlementError> {
        self.require_admin(&request.org_id, actor_id)?;
        let ent_id = entitlement_id(&request.target_uid, &request.key);
        let reason = request
            .reason
            .clone()
            .unwrap_or_else(|| DEFAULT_REVOKE_REASON.to_string());

        let revoked = {
            let mut state = self.lock();
            let current = state
                .entitlements
                .get_mut(&request.org_id)
                .and_then(|org| org.get_mut(&ent_id));
            current.map(|ent| {
                let before = lifecycle_view(ent);
                ent.status = EntitlementStatus::Revoked;
                ent.updated_at = now;
                ent.policy_version += 1;
                ent.revoke_reason = Some(reason.clone());
                (before, ent.policy_version)
            })
        };

        let Some((before, policy_version)) = revoked else {
            tracing::debug!(org_id = %request.org_id, entitlement_id = %ent_id, "revoke of missing entitlement");
            return Ok(MutationReceipt {
                entitlement_id: ent_id,
                policy_version: None,
                already_missing: true,
            });
        };

        tracing::info!(
            org_id = %request.org_id,
            actor_id = %actor_id,
            entitlement_id = %ent_id,
            policy_version,
            reason = %reason,
            "entitlement revoked"
        );
        self.sink.record_event(
            EventRecord::new(EventKind::EntitlementRevoke)
                .at(now)
                .with_org(&request.org_id)
                .with_actor(actor_id)
                .with_target(&request.target_uid)
                .with_before(before)
                .with_after(json!({
                    "status": EntitlementStatus::Revoked,
                    "policyVersion": policy_version,
                    "reason": reason,
                })),
        );

        Ok(MutationReceipt {
            entitlement_id: ent_id,
            policy_version: Some(policy_version),
            already_missing: false,
        })
    }

    /// Build and sign the offline snapshot for `uid`. The subject must be a
    /// member of the org.
    pub fn issue_snapshot(
        &self,
        org_id: &str,
        uid: &str,
        signer: &SnapshotSigner,
        now: DateTime<Utc>,
    ) -> Result<PolicySnapshot, EntitlementError> {
        let role = self.role_of(org_id, uid).ok_or_else(|| EntitlementError::NoRole {
            org_id: org_id.to_string(),
            uid: uid.to_string(),
        })?;
        let constraints = self.constraints_for(org_id);

        let mut policy_version = 0;
        let mut entitlements = BTreeMap::new();
        for ent in self.entitlements_for(org_id, uid) {
            policy_version = policy_version.max(ent.policy_version);
            entitlements.insert(ent.key.clone(), ent.for_snapshot());
        }

        let expires_at = Duration::try_seconds(constraints.max_offline_seconds)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or(EntitlementError::InvalidOfflineWindow {
                seconds: constraints.max_offline_seconds,
            })?;
        let body = UnsignedSnapshot {
            uid: uid.to_string(),
            org_id: org_id.to_string(),
            issued_at: now,
            expires_at,
            policy_version,
            roles: BTreeMap::from([(uid.to_string(), role)]),
            entitlements,
            constraints,
        };
        let snapshot = signer.sign(body)?;

        tracing::info!(
            org_id = %org_id,
            uid = %uid,
            kid = %signer.kid(),
            policy_version,
            "policy snapshot issued"
        );
        self.sink.record_event(
            EventRecord::new(EventKind::SnapshotIssue)
                .at(now)
                .with_org(org_id)
                .with_actor(uid)
                .with_target(uid)
                .with_after(json!({
                    "policyVersion": policy_version,
                    "expiresAt": expires_at,
                })),
        );
        Ok(snapshot)
    }
}

fn lifecycle_view(ent: &Entitlement) -> serde_json::Value {
    json!({
        "status": ent.status,
        "stage": ent.stage,
        "expiresAt": ent.expires_at,
        "policyVersion": ent.policy_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KeyCatalog;
    use crate::snapshot::SnapshotKeyring;
    use bane_audit::InMemoryStore;
    use std::sync::Arc;

    fn registry() -> (EntitlementRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let registry = EntitlementRegistry::new()
            .with_catalog(KeyCatalog::new().with_key("lidar", Stage::B, ["lidar:scan"]))
            .with_sink(AuditSink::inline(store.clone()));
        registry.set_member("o1", "boss", "admin");
        registry.set_member("o1", "u1", "inspector");
        (registry, store)
    }

    #[test]
    fn only_admins_mutate() {
        let (reg, store) = registry();
        let err = reg
            .issue("u1", &IssueRequest::new("o1", "u1", "vision"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EntitlementError::NotOrgAdmin { .. }));
        let err = reg
            .issue("boss", &IssueRequest::new("o2", "u1", "vision"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EntitlementError::NotOrgAdmin { .. }));
        assert!(store.events().is_empty());
    }

    #[test]
    fn issue_applies_catalog_defaults() {
        let (reg, store) = registry();
        let now = Utc::now();
        let receipt = reg.issue("boss", &IssueRequest::new("o1", "u1", "lidar"), now).unwrap();
        assert_eq!(receipt.entitlement_id, "u1_lidar");
        assert_eq!(receipt.policy_version, Some(1));

        let ent = reg.get("o1", "u1", "lidar").unwrap();
        assert_eq!(ent.stage, Stage::B);
        assert_eq!(ent.caps, vec!["lidar:scan"]);
        assert_eq!(ent.expires_at, now + Duration::days(30));
        assert_eq!(ent.status, EntitlementStatus::Active);

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::EntitlementIssue);
        assert!(events[0].before.is_none());
        assert_eq!(events[0].after.as_ref().unwrap()["policyVersion"], 1);
    }

    #[test]
    fn reissue_is_a_renewal_with_before_state() {
        let (reg, store) = registry();
        let now = Utc::now();
        let mut req = IssueRequest::new("o1", "u1", "vision");
        reg.issue("boss", &req, now).unwrap();
        req.days = Some(7);
        req.stage = Some(Stage::B);
        let receipt = reg.issue("boss", &req, now + Duration::days(1)).unwrap();
        assert_eq!(receipt.policy_version, Some(2));

        let events = store.events();
        assert_eq!(events[1].kind, EventKind::EntitlementRenew);
        let before = events[1].before.as_ref().unwrap();
        assert_eq!(before["stage"], "A");
        assert_eq!(before["policyVersion"], 1);
        assert_eq!(events[1].after.as_ref().unwrap()["stage"], "B");
    }

    #[test]
    fn zero_day_issue_is_rejected() {
        let (reg, _) = registry();
        let mut req = IssueRequest::new("o1", "u1", "vision");
        req.days = Some(0);
        assert!(matches!(
            reg.issue("boss", &req, Utc::now()),
            Err(EntitlementError::InvalidDuration { days: 0 })
        ));
    }

    #[test]
    fn oversized_issue_is_rejected_not_overflowed() {
        let (reg, store) = registry();
        let mut req = IssueRequest::new("o1", "u1", "vision");
        for days in [i64::MAX / 2, i64::MAX, MAX_ENTITLEMENT_DAYS + 1] {
            req.days = Some(days);
            assert!(matches!(
                reg.issue("boss", &req, Utc::now()),
                Err(EntitlementError::InvalidDuration { days: d }) if d == days
            ));
        }
        assert!(reg.get("o1", "u1", "vision").is_none());
        assert!(store.events().is_empty());

        req.days = Some(MAX_ENTITLEMENT_DAYS);
        assert!(reg.issue("boss", &req, Utc::now()).is_ok());
    }

    #[test]
    fn revoke_keeps_the_record() {
        let (reg, store) = registry();
        let now = Utc::now();
        reg.issue("boss", &IssueRequest::new("o1", "u1", "vision"), now).unwrap();
        let receipt = reg
            .revoke(
                "boss",
                &RevokeRequest {
                    org_id: "o1".into(),
                    target_uid: "u1".into(),
                    key: "vision".into(),
                    reason: None,
                },
                now,
            )
            .unwrap();
        assert_eq!(receipt.policy_version, Some(2));

        let ent = reg.get("o1", "u1", "vision").unwrap();
        assert!(ent.is_revoked());
        assert_eq!(ent.revoke_reason.as_deref(), Some(DEFAULT_REVOKE_REASON));

        let ev = store.events().pop().unwrap();
        assert_eq!(ev.kind, EventKind::EntitlementRevoke);
        assert_eq!(ev.before.unwrap()["status"], "active");
        assert_eq!(ev.after.unwrap()["reason"], "admin_revoke");
    }

    #[test]
    fn revoking_missing_entitlement_reports_it() {
        let (reg, store) = registry();
        let req = RevokeRequest {
            org_id: "o1".into(),
            target_uid: "u1".into(),
            key: "ghost".into(),
            reason: Some("cleanup".into()),
        };
        let receipt = reg.revoke("boss", &req, Utc::now()).unwrap();
        assert!(receipt.already_missing);
        assert_eq!(receipt.policy_version, None);
        assert!(store.events().is_empty());
    }

    #[test]
    fn snapshot_collects_subject_entitlements() {
        let (reg, store) = registry();
        let now = Utc::now();
        reg.issue("boss", &IssueRequest::new("o1", "u1", "vision"), now).unwrap();
        reg.issue("boss", &IssueRequest::new("o1", "u1", "vision"), now).unwrap();
        reg.issue("boss", &IssueRequest::new("o1", "u1", "lidar"), now).unwrap();
        reg.issue("boss", &IssueRequest::new("o1", "boss", "lidar"), now).unwrap();

        let signer = SnapshotSigner::new("k1", b"secret").unwrap();
        let snap = reg.issue_snapshot("o1", "u1", &signer, now).unwrap();
        assert_eq!(snap.body.policy_version, 2);
        assert_eq!(snap.body.entitlements.len(), 2);
        assert!(snap.body.entitlements.values().all(|e| e.org_id.is_none()));
        assert_eq!(snap.body.roles.get("u1").map(String::as_str), Some("inspector"));
        assert_eq!(snap.body.expires_at, now + Duration::seconds(21_600));

        let mut ring = SnapshotKeyring::new();
        ring.insert("o1", "k1", b"secret").unwrap();
        assert!(ring.verify(&snap).is_ok());

        let ev = store.events().pop().unwrap();
        assert_eq!(ev.kind, EventKind::SnapshotIssue);
        assert_eq!(ev.after.unwrap()["policyVersion"], 2);
    }

    #[test]
    fn snapshot_needs_membership() {
        let (reg, _) = registry();
        let signer = SnapshotSigner::new("k1", b"secret").unwrap();
        assert!(matches!(
            reg.issue_snapshot("o1", "stranger", &signer, Utc::now()),
            Err(EntitlementError::NoRole { .. })
        ));
    }

    #[test]
    fn org_constraints_flow_into_snapshots() {
        let (reg, _) = registry();
        reg.set_constraints(
            "o1",
            PolicyConstraints {
                offline_allowed: false,
                max_offline_seconds: 60,
                ..PolicyConstraints::default()
            },
        );
        let now = Utc::now();
        let signer = SnapshotSigner::new("k1", b"secret").unwrap();
        let snap = reg.issue_snapshot("o1", "u1", &signer, now).unwrap();
        assert!(!snap.body.constraints.offline_allowed);
        assert_eq!(snap.body.expires_at, now + Duration::seconds(60));
        assert_eq!(snap.body.policy_version, 0);
    }

    #[test]
    fn out_of_range_offline_window_is_an_error() {
        let (reg, _) = registry();
        reg.set_constraints(
            "o1",
            PolicyConstraints {
                max_offline_seconds: i64::MAX,
                ..PolicyConstraints::default()
            },
        );
        let signer = SnapshotSigner::new("k1", b"secret").unwrap();
        assert!(matches!(
            reg.issue_snapshot("o1", "u1", &signer, Utc::now()),
            Err(EntitlementError::InvalidOfflineWindow { seconds: i64::MAX })
        ));
    }
}
