// entitlement.rs — The entitlement data model.
//
// An entitlement grants one identity one key within one org, at a stage,
// until an expiry. Entitlements are never deleted: revocation and expiry are
// status transitions, and every mutation bumps `policy_version`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ranked capability tier. `NA < A < B`; B implies A.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stage {
    A,
    B,
    #[serde(rename = "NA")]
    Na,
}

impl Stage {
    pub fn rank(&self) -> u8 {
        match self {
            Stage::Na => 0,
            Stage::A => 1,
            Stage::B => 2,
        }
    }

    /// True when this stage is at least `required`.
    pub fn satisfies(&self, required: Stage) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::A => "A",
            Stage::B => "B",
            Stage::Na => "NA",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Stage::A),
            "B" | "b" => Ok(Stage::B),
            "NA" | "na" => Ok(Stage::Na),
            other => Err(format!("unknown stage '{}' (expected A, B, or NA)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementStatus {
    Active,
    Grace,
    Expired,
    Revoked,
}

/// One identity's grant of one key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub uid: String,
    /// Omitted from snapshot copies, where the snapshot carries the org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub key: String,
    pub stage: Stage,
    pub status: EntitlementStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seat_bound: bool,
    #[serde(default)]
    pub device_bound: bool,
    #[serde(default)]
    pub allowed_device_ids: Vec<String>,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub policy_version: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke_reason: Option<String>,
}

impl Entitlement {
    pub fn is_revoked(&self) -> bool {
        self.status == EntitlementStatus::Revoked
    }

    /// Expired status, or past the relevant deadline: `grace_until` for a
    /// grace entitlement that has one, `expires_at` otherwise.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.grace_until) {
            (EntitlementStatus::Expired, _) => true,
            (EntitlementStatus::Grace, Some(grace_until)) => now >= grace_until,
            _ => now >= self.expires_at,
        }
    }

    /// A device-bound entitlement admits only devices on a non-empty
    /// allow-list. Unbound entitlements admit any caller.
    pub fn admits_device(&self, device_id: Option<&str>) -> bool {
        if !self.device_bound {
            return true;
        }
        match device_id {
            Some(id) if !id.is_empty() => self.allowed_device_ids.iter().any(|d| d == id),
            _ => false,
        }
    }

    /// The copy embedded in a policy snapshot.
    pub fn for_snapshot(&self) -> Self {
        Self {
            org_id: None,
            ..self.clone()
        }
    }
}

/// Entitlement id within an org: `<uid>_<key>`.
pub fn entitlement_id(uid: &str, key: &str) -> String {
    format!("{}_{}", uid, key)
}
