// input.rs — Request and decision types for `BaneEngine::evaluate`.
//
// These are the wire types: field names are camelCase so JSON produced by
// other services deserializes directly. Every optional field defaults to
// absent, and absence always resolves toward denial (no identity → NO_AUTH,
// missing attestation flags → false).

use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity, Verdict};
use crate::redaction::RedactionSpan;
use crate::throttle::ThrottleDecision;

/// Upstream attestation of session freshness.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionIntegrity {
    pub nonce_ok: bool,
    pub signature_ok: bool,
    pub token_fresh: bool,
}

impl SessionIntegrity {
    /// All three checks passed upstream.
    pub fn verified() -> Self {
        Self {
            nonce_ok: true,
            signature_ok: true,
            token_fresh: true,
        }
    }

    pub fn all_ok(&self) -> bool {
        self.nonce_ok && self.signature_ok && self.token_fresh
    }
}

/// Who is calling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthContext {
    pub identity_id: Option<String>,
    pub session_id: Option<String>,
    pub capabilities: Vec<String>,
    /// Must be set by whatever authenticated the caller.
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    pub session_integrity: SessionIntegrity,
}

impl AuthContext {
    /// An authenticated identity with no capabilities and no attestation.
    pub fn new(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: Some(identity_id.into()),
            authenticated: true,
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_ip_hash(mut self, ip_hash: impl Into<String>) -> Self {
        self.ip_hash = Some(ip_hash.into());
        self
    }

    pub fn with_integrity(mut self, integrity: SessionIntegrity) -> Self {
        self.session_integrity = integrity;
        self
    }

    /// The identity, if present, non-empty, and authenticated.
    pub fn authenticated_identity(&self) -> Option<&str> {
        match self.identity_id.as_deref() {
            Some(id) if self.authenticated && !id.is_empty() => Some(id),
            _ => None,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Where the request is going and who sent it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthContext>,
}

/// One request to evaluate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub req: RequestContext,
}

impl EvaluationInput {
    pub fn new(text: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            req: RequestContext {
                route: route.into(),
                ..RequestContext::default()
            },
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.req.required_capability = Some(capability.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.req.auth = Some(auth);
        self
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        self.req.auth.as_ref()
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.auth().and_then(|a| a.identity_id.as_deref())
    }
}

/// The engine's decision for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutput {
    pub verdict: Verdict,
    pub severity: Severity,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redactions: Option<Vec<RedactionSpan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_text: Option<String>,
    pub trace_id: String,
    pub timing_ms: u64,
    /// 0..=5.
    pub enforcement_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleDecision>,
}

impl EvaluationOutput {
    pub fn is_denied(&self) -> bool {
        self.verdict == Verdict::Deny
    }

    /// Id of the highest-ranked finding. For preflight denials this is the
    /// denial code (`NO_AUTH`, `REPLAY_DETECTED`, ...).
    pub fn primary_finding(&self) -> Option<&str> {
        self.findings.first().map(|f| f.id.as_str())
    }

    /// Retry hint in milliseconds when the throttle blocked the caller.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self.throttle {
            Some(ThrottleDecision::Block { retry_after_ms }) => Some(retry_after_ms),
            _ => None,
        }
    }
}
