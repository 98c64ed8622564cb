// engine.rs — BaneEngine: the request-scoped enforcement pipeline.
//
// preflight → detectors → aggregate → escalate → throttle → redact →
// sanitize public message → audit sink → decision.
//
// All cross-request state (risk ledger, nonce cache, throttle) lives in the
// engine instance. Two engines never share state, and one engine can be
// shared across threads behind an `Arc`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use bane_audit::hasher::hash_str;
use bane_audit::{AuditRecord, AuditSink, BaneStore, EventKind, EventRecord, IncidentRecord};

use crate::aggregate::aggregate;
use crate::clock::{Clock, SystemClock};
use crate::detector::{normalize_for_detection, DetectionInput, Detector, DetectorRegistry};
use crate::error::PolicyError;
use crate::escalation::escalate;
use crate::finding::{sort_findings, Finding, Severity, Verdict};
use crate::input::{AuthContext, EvaluationInput, EvaluationOutput};
use crate::integrity::RequestVerifier;
use crate::ledger::RiskLedger;
use crate::nonce::NonceCache;
use crate::preflight::{DenialCode, Preflight};
use crate::profile::PolicyHints;
use crate::public::{public_message_for, sanitize_public_message};
use crate::redaction::{apply_redactions, redactions_from_findings};
use crate::throttle::{ThrottleController, ThrottleDecision, ThrottleKey};

/// The live enforcement engine.
pub struct BaneEngine {
    profile_id: String,
    hints: PolicyHints,
    detectors: DetectorRegistry,
    ledger: RiskLedger,
    nonces: NonceCache,
    throttle: ThrottleController,
    clock: Arc<dyn Clock>,
    sink: AuditSink,
    verifier: Option<Arc<dyn RequestVerifier>>,
}

impl BaneEngine {
    /// An engine for `profile_id` with the baseline detectors, system clock,
    /// and no audit store.
    pub fn new(profile_id: &str) -> Result<Self, PolicyError> {
        Ok(Self {
            profile_id: profile_id.to_string(),
            hints: PolicyHints::for_profile(profile_id)?,
            detectors: DetectorRegistry::baseline(),
            ledger: RiskLedger::new(),
            nonces: NonceCache::default(),
            throttle: ThrottleController::new(),
            clock: Arc::new(SystemClock),
            sink: AuditSink::disabled(),
            verifier: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: AuditSink) -> Self {
        self.sink = sink;
        self
    }

    /// Shorthand for a background sink over `store`. Use [`with_sink`]
    /// with [`AuditSink::inline`] when writes must land before `evaluate`
    /// returns.
    ///
    /// [`with_sink`]: Self::with_sink
    pub fn with_store(self, store: Arc<dyn BaneStore>) -> Self {
        self.with_sink(AuditSink::background(store))
    }

    pub fn with_nonce_cache(mut self, nonces: NonceCache) -> Self {
        self.nonces = nonces;
        self
    }

    /// Verify payload signatures instead of trusting the upstream
    /// `signatureOk` attestation alone.
    pub fn with_verifier(mut self, verifier: Arc<dyn RequestVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Result<Self, PolicyError> {
        self.detectors.register(detector)?;
        Ok(self)
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn hints(&self) -> &PolicyHints {
        &self.hints
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn throttle(&self) -> &ThrottleController {
        &self.throttle
    }

    pub fn sink(&self) -> &AuditSink {
        &self.sink
    }

    pub fn detector_ids(&self) -> Vec<&str> {
        self.detectors.ids()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Lock `identity_id` until `until`, replacing any existing lock window.
    pub fn lock_identity(&self, identity_id: &str, until: DateTime<Utc>) {
        self.ledger.force_lock(identity_id, until, self.clock.now());
    }

    /// Clear the identity's lock, strikes, and throttle history.
    /// Returns whether any state existed.
    pub fn unlock_identity(&self, identity_id: &str) -> bool {
        let had_record = self.ledger.unlock(identity_id);
        let had_throttle = self
            .throttle
            .reset(&ThrottleKey::Identity(identity_id.to_string()));
        had_record || had_throttle
    }

    /// Evaluate one request. Never fails: every outcome is a decision.
    pub fn evaluate(&self, input: &EvaluationInput) -> EvaluationOutput {
        let started = Instant::now();
        let now = self.clock.now();
        let trace_id = Uuid::new_v4().to_string();

        let auth = input.auth();
        let throttle_key = ThrottleKey::from_parts(
            auth.and_then(AuthContext::authenticated_identity),
            auth.and_then(|a| a.ip_hash.as_deref()),
        );

        let gate = Preflight {
            hints: &self.hints,
            ledger: &self.ledger,
            nonces: &self.nonces,
            verifier: self.verifier.as_deref(),
        };

        let mut output = match gate.check(input, now) {
            Some(code) => self.deny_preflight(code, trace_id, &throttle_key, now),
            None => self.run_pipeline(input, trace_id, &throttle_key, now),
        };
        output.timing_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        output.public_message = output
            .public_message
            .as_deref()
            .map(sanitize_public_message);

        self.record_side_effects(input, &output, now);
        output
    }

    fn deny_preflight(
        &self,
        code: DenialCode,
        trace_id: String,
        throttle_key: &ThrottleKey,
        now: DateTime<Utc>,
    ) -> EvaluationOutput {
        let level = code.enforcement_level();
        EvaluationOutput {
            verdict: Verdict::Deny,
            severity: Severity::High,
            findings: vec![code.finding()],
            redactions: None,
            safe_text: None,
            trace_id,
            timing_ms: 0,
            enforcement_level: level,
            public_message: public_message_for(Verdict::Deny, level).map(str::to_string),
            throttle: Some(self.throttle.strike(throttle_key, now)),
        }
    }

    fn run_pipeline(
        &self,
        input: &EvaluationInput,
        trace_id: String,
        throttle_key: &ThrottleKey,
        now: DateTime<Utc>,
    ) -> EvaluationOutput {
        let normalized = normalize_for_detection(&input.text);
        let detection = DetectionInput {
            text: &normalized,
            raw: &input.text,
            route: &input.req.route,
        };
        let findings = sort_findings(self.detectors.run(&detection, &self.hints));
        let agg = aggregate(&findings);

        let mut level = agg.verdict.base_enforcement_level();
        let identity_id = input.auth().and_then(AuthContext::authenticated_identity);
        if agg.verdict == Verdict::Deny && self.hints.escalation_enabled {
            if let Some(identity_id) = identity_id {
                let escalation = escalate(&self.ledger, identity_id, agg.severity, now);
                level = escalation.level;
                if let Some(until) = escalation.locked_until {
                    tracing::warn!(
                        trace_id = %trace_id,
                        level = escalation.level,
                        strikes = escalation.strikes,
                        locked_until = %until,
                        "identity locked"
                    );
                    self.sink.record_event(
                        EventRecord::new(EventKind::IdentityLocked)
                            .at(now)
                            .with_trace(trace_id.clone())
                            .with_target(identity_id)
                            .with_after(serde_json::json!({
                                "strikes": escalation.strikes,
                                "lockedUntil": until,
                                "enforcementLevel": escalation.level,
                            })),
                    );
                }
            }
        }

        let spans = redactions_from_findings(&input.text, &findings);
        let safe_text = match agg.verdict {
            Verdict::Sanitize | Verdict::Review if !spans.is_empty() => {
                Some(apply_redactions(&input.text, &spans))
            }
            _ => None,
        };

        let throttle = (agg.verdict == Verdict::Deny).then(|| self.throttle.strike(throttle_key, now));

        EvaluationOutput {
            verdict: agg.verdict,
            severity: agg.severity,
            findings,
            redactions: (!spans.is_empty()).then_some(spans),
            safe_text,
            trace_id,
            timing_ms: 0,
            enforcement_level: level,
            public_message: public_message_for(agg.verdict, level).map(str::to_string),
            throttle,
        }
    }

    fn record_side_effects(&self, input: &EvaluationInput, output: &EvaluationOutput, now: DateTime<Utc>) {
        let auth = input.auth();
        let identity_id = auth.and_then(|a| a.identity_id.clone());
        let session_id = auth.and_then(|a| a.session_id.clone());
        let finding_ids: Vec<String> = output.findings.iter().map(|f| f.id.clone()).collect();

        if output.is_denied() {
            tracing::warn!(
                trace_id = %output.trace_id,
                route = %input.req.route,
                level = output.enforcement_level,
                code = output.primary_finding().unwrap_or("-"),
                throttle = output.throttle.as_ref().map(ThrottleDecision::label).unwrap_or("-"),
                "request denied"
            );
            let mut event = EventRecord::new(EventKind::DecisionDenied)
                .at(now)
                .with_trace(output.trace_id.clone())
                .with_after(serde_json::json!({
                    "enforcementLevel": output.enforcement_level,
                    "findingIds": finding_ids,
                }));
            if let Some(identity_id) = &identity_id {
                event = event.with_target(identity_id.clone());
            }
            self.sink.record_event(event);
        } else {
            tracing::debug!(
                trace_id = %output.trace_id,
                verdict = %output.verdict,
                level = output.enforcement_level,
                "request evaluated"
            );
        }

        let mut audit = AuditRecord::new(
            output.trace_id.clone(),
            output.verdict.as_str(),
            output.severity.as_str(),
            output.enforcement_level,
        )
        .at(now)
        .with_profile(self.profile_id.clone())
        .with_route(input.req.route.clone())
        .with_identity(identity_id.clone(), session_id.clone())
        .with_findings(finding_ids.clone())
        .with_input_hash(hash_str(&input.text))
        .with_timing(output.timing_ms);
        if let Some(throttle) = &output.throttle {
            audit = audit.with_throttle(throttle.label());
        }
        self.sink.record_audit(audit);

        if output.enforcement_level == 5 && self.hints.incident_on_critical {
            let tags = output
                .findings
                .iter()
                .flat_map(|f: &Finding| f.tags.iter().cloned())
                .collect();
            self.sink.record_incident(
                IncidentRecord::new(
                    output.trace_id.clone(),
                    output.severity.as_str(),
                    output.enforcement_level,
                )
                .at(now)
                .with_subject(identity_id, session_id, auth.and_then(|a| a.ip_hash.clone()))
                .with_findings(finding_ids, tags),
            );
        }
    }
}
