// http.rs — HTTP request guard.
//
// Framework-agnostic: the caller extracts path, headers, body, and the
// authenticated identity from its own request type, and applies the returned
// status and headers to its own response type.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bane_policy::{AuthContext, BaneEngine, EvaluationInput, EvaluationOutput, SessionIntegrity, Verdict};

/// Replay nonce, one per request.
pub const NONCE_HEADER: &str = "x-bane-nonce";
/// Base64url HMAC over `identity\nnonce\nbody`.
pub const SIGNATURE_HEADER: &str = "x-bane-signature";
/// Set on every response, allow or deny.
pub const TRACE_ID_HEADER: &str = "x-bane-trace-id";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

pub const STATUS_OK: u16 = 200;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_LOCKED: u16 = 423;

/// The parts of an inbound HTTP request the guard needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequest {
    pub path: String,
    /// Header names are matched case-insensitively.
    pub headers: BTreeMap<String, String>,
    pub body_text: String,
    pub identity_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_hash: Option<String>,
    pub capabilities: Vec<String>,
    /// Upstream attestation. When absent, an identified request is taken as
    /// attested by whatever authenticated it, and an anonymous one is not.
    pub session_integrity: Option<SessionIntegrity>,
}

impl HttpRequest {
    /// Case-insensitive header lookup. An empty value counts as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// What to send back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpDecision {
    pub ok: bool,
    pub status: u16,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub headers: BTreeMap<String, String>,
    /// Redacted body for sanitize decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_text: Option<String>,
}

/// Evaluates HTTP requests and maps the outcome to a response.
pub struct HttpGuard {
    engine: Arc<BaneEngine>,
    required_capability: Option<String>,
}

impl HttpGuard {
    pub fn new(engine: Arc<BaneEngine>) -> Self {
        Self {
            engine,
            required_capability: None,
        }
    }

    /// Require `capability` on every request.
    pub fn with_required_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capability = Some(capability.into());
        self
    }

    pub fn engine(&self) -> &Arc<BaneEngine> {
        &self.engine
    }

    /// Build the engine input. A request carrying an identity is treated as
    /// authenticated and, unless it says otherwise, attested upstream.
    pub fn to_input(&self, request: &HttpRequest) -> EvaluationInput {
        let identity = request.identity_id.as_deref().filter(|id| !id.is_empty());
        let integrity = request.session_integrity.unwrap_or(if identity.is_some() {
            SessionIntegrity::verified()
        } else {
            SessionIntegrity::default()
        });

        let mut auth = AuthContext {
            capabilities: request.capabilities.clone(),
            session_integrity: integrity,
            session_id: request.session_id.clone(),
            ip_hash: request.ip_hash.clone(),
            nonce: request.header(NONCE_HEADER).map(str::to_string),
            signature: request.header(SIGNATURE_HEADER).map(str::to_string),
            ..AuthContext::default()
        };
        if let Some(id) = identity {
            auth.identity_id = Some(id.to_string());
            auth.authenticated = true;
        }

        let mut input = EvaluationInput::new(request.body_text.clone(), request.path.clone()).with_auth(auth);
        if let Some(cap) = &self.required_capability {
            input = input.with_capability(cap.clone());
        }
        input
    }

    /// Evaluate `request`. Returns the HTTP view and the full engine output.
    pub fn check(&self, request: &HttpRequest) -> (HttpDecision, EvaluationOutput) {
        let output = self.engine.evaluate(&self.to_input(request));
        (decision_for(&output), output)
    }
}

/// Map an engine decision onto an HTTP response.
pub fn decision_for(output: &EvaluationOutput) -> HttpDecision {
    let status = status_for(output);
    let mut headers = BTreeMap::new();
    headers.insert(TRACE_ID_HEADER.to_string(), output.trace_id.clone());
    let retry_after_ms = output.retry_after_ms();
    if let Some(ms) = retry_after_ms {
        headers.insert(RETRY_AFTER_HEADER.to_string(), retry_after_secs(ms).to_string());
    }
    HttpDecision {
        ok: status == STATUS_OK,
        status,
        trace_id: output.trace_id.clone(),
        message: output.public_message.clone(),
        retry_after_ms,
        headers,
        safe_text: output.safe_text.clone(),
    }
}

/// Deny at level 4 → 423, any other deny (critical level 5 included) → 403,
/// review → 401, allow and sanitize → 200.
pub fn status_for(output: &EvaluationOutput) -> u16 {
    match output.verdict {
        Verdict::Deny if output.enforcement_level == 4 => STATUS_LOCKED,
        Verdict::Deny => STATUS_FORBIDDEN,
        Verdict::Review => STATUS_UNAUTHORIZED,
        Verdict::Allow | Verdict::Sanitize => STATUS_OK,
    }
}

/// Whole seconds, rounded up.
pub fn retry_after_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Default capabilities for an org role.
pub fn caps_for_role(role: Option<&str>) -> Vec<&'static str> {
    match role.map(str::to_ascii_lowercase).as_deref() {
        Some("admin") => vec!["bane:invoke", "tool:db_read", "tool:db_write", "tool:external_call"],
        Some("inspector") => vec!["bane:invoke", "tool:db_read", "tool:db_write"],
        Some("viewer") => vec!["bane:invoke", "tool:db_read"],
        _ => vec!["bane:invoke"],
    }
}

/// Explicit token caps win (with `bane:invoke` always granted); otherwise
/// the role's defaults apply.
pub fn resolve_capabilities(token_caps: &[String], role: Option<&str>) -> Vec<String> {
    if token_caps.is_empty() {
        return caps_for_role(role).into_iter().map(str::to_string).collect();
    }
    let mut caps = vec!["bane:invoke".to_string()];
    caps.extend(token_caps.iter().filter(|c| *c != "bane:invoke").cloned());
    caps
}
