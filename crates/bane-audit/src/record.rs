// record.rs — Audit, event, and incident data model.
//
// Records are the persisted form of engine output. They deliberately carry
// plain strings for verdict/severity so this crate has no dependency on the
// policy crate, and they never carry raw request text: only its SHA-256.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line per evaluated request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub at: DateTime<Utc>,
    pub trace_id: String,
    pub profile_id: String,
    pub route: String,
    pub identity_id: Option<String>,
    pub session_id: Option<String>,
    /// "allow" | "sanitize" | "review" | "deny".
    pub verdict: String,
    /// "low" | "medium" | "high" | "critical".
    pub severity: String,
    pub enforcement_level: u8,
    pub finding_ids: Vec<String>,
    /// SHA-256 of the request text.
    pub input_hash: Option<String>,
    pub timing_ms: u64,
    /// Throttle action attached to the decision, if any.
    pub throttle: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditRecord {
    /// Create a record for a decision. Optional fields start empty.
    pub fn new(
        trace_id: impl Into<String>,
        verdict: impl Into<String>,
        severity: impl Into<String>,
        enforcement_level: u8,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            at: Utc::now(),
            trace_id: trace_id.into(),
            profile_id: String::new(),
            route: String::new(),
            identity_id: None,
            session_id: None,
            verdict: verdict.into(),
            severity: severity.into(),
            enforcement_level,
            finding_ids: Vec::new(),
            input_hash: None,
            timing_ms: 0,
            throttle: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = profile_id.into();
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_identity(mut self, identity_id: Option<String>, session_id: Option<String>) -> Self {
        self.identity_id = identity_id;
        self.session_id = session_id;
        self
    }

    pub fn with_findings(mut self, finding_ids: Vec<String>) -> Self {
        self.finding_ids = finding_ids;
        self
    }

    pub fn with_input_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_hash = Some(hash.into());
        self
    }

    pub fn with_timing(mut self, timing_ms: u64) -> Self {
        self.timing_ms = timing_ms;
        self
    }

    pub fn with_throttle(mut self, throttle: impl Into<String>) -> Self {
        self.throttle = Some(throttle.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What kind of state change an event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A request was denied (preflight or detection).
    DecisionDenied,
    /// Escalation locked an identity.
    IdentityLocked,
    /// An operator force-locked an identity.
    OperatorForceLock,
    /// An operator cleared an identity's lock and strikes.
    OperatorForceUnlock,
    EntitlementIssue,
    EntitlementRenew,
    EntitlementRevoke,
    SnapshotIssue,
}

/// A security-relevant state change, with optional before/after state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub trace_id: Option<String>,
    pub org_id: Option<String>,
    pub actor_id: Option<String>,
    pub target_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl EventRecord {
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            at: Utc::now(),
            kind,
            trace_id: None,
            org_id: None,
            actor_id: None,
            target_id: None,
            before: None,
            after: None,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }
}

/// A critical denial worth human follow-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub incident_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub trace_id: String,
    pub identity_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_hash: Option<String>,
    pub severity: String,
    pub enforcement_level: u8,
    pub finding_ids: Vec<String>,
    pub tags: Vec<String>,
}

impl IncidentRecord {
    pub fn new(trace_id: impl Into<String>, severity: impl Into<String>, enforcement_level: u8) -> Self {
        Self {
            incident_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            trace_id: trace_id.into(),
            identity_id: None,
            session_id: None,
            ip_hash: None,
            severity: severity.into(),
            enforcement_level,
            finding_ids: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn with_subject(
        mut self,
        identity_id: Option<String>,
        session_id: Option<String>,
        ip_hash: Option<String>,
    ) -> Self {
        self.identity_id = identity_id;
        self.session_id = session_id;
        self.ip_hash = ip_hash;
        self
    }

    /// Attach finding ids and the union of their tags (deduplicated, sorted).
    pub fn with_findings(mut self, finding_ids: Vec<String>, mut tags: Vec<String>) -> Self {
        tags.sort();
        tags.dedup();
        self.finding_ids = finding_ids;
        self.tags = tags;
        self
    }
}
