// evaluator.rs — Entitlement decisions, online and offline.
//
// A decision is a pure function of the request, the entitlement source and
// `now`. Offline decisions can only be made from a VerifiedSnapshot; the
// offline hard-deny constraints are applied before any entitlement is looked
// at, so no entitlement scope can override them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entitlement::{Entitlement, Stage};
use crate::snapshot::VerifiedSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    Ok,
    NoAuth,
    NoOrg,
    OfflinePolicyMissing,
    OfflinePolicyExpired,
    OfflineDenyExternal,
    OfflineDenyControl,
    SnapshotSubjectMismatch,
    NoEntitlement,
    Revoked,
    Expired,
    StageInsufficient,
    DeviceNotAllowed,
}

/// What the caller wants to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitlementRequest {
    pub auth_uid: Option<String>,
    pub org_id: Option<String>,
    pub key: String,
    /// Any stage is acceptable when absent.
    pub required_stage: Option<Stage>,
    pub requires_external_hardware: bool,
    pub requires_physical_control: bool,
    pub device_id: Option<String>,
    pub online: bool,
}

impl EntitlementRequest {
    pub fn new(uid: impl Into<String>, org_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            auth_uid: Some(uid.into()),
            org_id: Some(org_id.into()),
            key: key.into(),
            online: true,
            ..Self::default()
        }
    }

    /// Decide from a snapshot under the offline constraints.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.required_stage = Some(stage);
        self
    }

    /// The device the request comes from, for device-bound entitlements.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn requiring_external_hardware(mut self) -> Self {
        self.requires_external_hardware = true;
        self
    }

    pub fn requiring_physical_control(mut self) -> Self {
        self.requires_physical_control = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementDecision {
    pub allow: bool,
    pub reason: DecisionReason,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps_granted: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<u64>,
}

impl EntitlementDecision {
    fn deny(reason: DecisionReason, key: &str) -> Self {
        Self {
            allow: false,
            reason,
            key: key.to_string(),
            required_stage: None,
            effective_stage: None,
            caps_granted: None,
            policy_version: None,
        }
    }

    fn at_version(mut self, policy_version: Option<u64>) -> Self {
        self.policy_version = policy_version;
        self
    }
}

/// Decide whether `request` is entitled.
///
/// Offline requests consult only `snapshot`. Online requests prefer the
/// direct `entitlement` and fall back to the snapshot's copy.
pub fn evaluate_entitlement(
    request: &EntitlementRequest,
    snapshot: Option<&VerifiedSnapshot>,
    entitlement: Option<&Entitlement>,
    now: DateTime<Utc>,
) -> EntitlementDecision {
    let key = request.key.as_str();
    let Some(uid) = request.auth_uid.as_deref().filter(|s| !s.is_empty()) else {
        return EntitlementDecision::deny(DecisionReason::NoAuth, key);
    };
    let Some(org_id) = request.org_id.as_deref().filter(|s| !s.is_empty()) else {
        return EntitlementDecision::deny(DecisionReason::NoOrg, key);
    };

    if !request.online {
        return evaluate_offline(request, uid, org_id, snapshot, now);
    }

    if let Some(direct) = entitlement {
        return check_entitlement(request, direct, Some(direct.policy_version), now);
    }
    match snapshot {
        Some(verified) => {
            let body = verified.body();
            if body.uid != uid || body.org_id != org_id {
                return EntitlementDecision::deny(DecisionReason::SnapshotSubjectMismatch, key)
                    .at_version(Some(body.policy_version));
            }
            match body.entitlements.get(key) {
                Some(ent) => check_entitlement(request, ent, Some(ent.policy_version), now),
                None => EntitlementDecision::deny(DecisionReason::NoEntitlement, key),
            }
        }
        None => EntitlementDecision::deny(DecisionReason::NoEntitlement, key),
    }
}

fn evaluate_offline(
    request: &EntitlementRequest,
    uid: &str,
    org_id: &str,
    snapshot: Option<&VerifiedSnapshot>,
    now: DateTime<Utc>,
) -> EntitlementDecision {
    let key = request.key.as_str();
    let Some(verified) = snapshot else {
        return EntitlementDecision::deny(DecisionReason::OfflinePolicyMissing, key);
    };
    let body = verified.body();
    let version = Some(body.policy_version);
    let deny = |reason| EntitlementDecision::deny(reason, key).at_version(version);

    if body.uid != uid || body.org_id != org_id {
        return deny(DecisionReason::SnapshotSubjectMismatch);
    }
    if !body.constraints.offline_allowed || now >= body.effective_expiry() {
        return deny(DecisionReason::OfflinePolicyExpired);
    }
    if request.requires_external_hardware && body.constraints.offline_hard_deny_external_hardware {
        return deny(DecisionReason::OfflineDenyExternal);
    }
    if request.requires_physical_control && body.constraints.offline_hard_deny_physical_control {
        return deny(DecisionReason::OfflineDenyControl);
    }

    match body.entitlements.get(key) {
        Some(ent) => check_entitlement(request, ent, version, now),
        None => deny(DecisionReason::NoEntitlement),
    }
}

/// Presence is already established: revoked, expired, stage, device.
fn check_entitlement(
    request: &EntitlementRequest,
    ent: &Entitlement,
    policy_version: Option<u64>,
    now: DateTime<Utc>,
) -> EntitlementDecision {
    let key = request.key.as_str();
    if ent.is_revoked() {
        return EntitlementDecision::deny(DecisionReason::Revoked, key).at_version(policy_version);
    }
    if ent.is_expired(now) {
        return EntitlementDecision::deny(DecisionReason::Expired, key).at_version(policy_version);
    }

    let staged = |reason| EntitlementDecision {
        required_stage: request.required_stage,
        effective_stage: Some(ent.stage),
        ..EntitlementDecision::deny(reason, key).at_version(policy_version)
    };

    if let Some(required) = request.required_stage {
        if !ent.stage.satisfies(required) {
            return staged(DecisionReason::StageInsufficient);
        }
    }
    if !ent.admits_device(request.device_id.as_deref()) {
        return staged(DecisionReason::DeviceNotAllowed);
    }

    EntitlementDecision {
        allow: true,
        caps_granted: Some(ent.caps.clone()),
        ..staged(DecisionReason::Ok)
    }
}
