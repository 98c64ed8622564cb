//! # bane-policy
//!
//! The live policy-enforcement pipeline for BANE.
//!
//! [`BaneEngine::evaluate`] decides, for every inbound request, whether it is
//! allowed, must be sanitized, needs further authorization, or is denied. It
//! also keeps per-identity risk state (strikes and locks), a replay-nonce
//! cache, and throttle history across requests.
//!
//! ## Key invariants
//!
//! - **Fail closed**: no authenticated identity → denied. Missing attestation
//!   flags → denied in strict profiles.
//! - **Deterministic**: detectors always run in `(order, id)` order and
//!   findings are sorted before they are returned.
//! - **No leakage**: every caller-facing message passes through
//!   [`sanitize_public_message`]. Raw request text is never logged or stored.
//! - **Side channel**: audit persistence never changes or fails a decision.
//!
//! ## Quick Example
//!
//! ```rust
//! use bane_policy::{AuthContext, BaneEngine, EvaluationInput, SessionIntegrity, Verdict, FOG_V1};
//!
//! let engine = BaneEngine::new(FOG_V1).unwrap();
//! let input = EvaluationInput::new("Summarize today's inspection", "/chat").with_auth(
//!     AuthContext::new("user-1").with_integrity(SessionIntegrity::verified()),
//! );
//! let out = engine.evaluate(&input);
//! assert_eq!(out.verdict, Verdict::Allow);
//! ```

pub mod aggregate;
pub mod baseline;
pub mod clock;
pub mod detector;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod finding;
pub mod input;
pub mod integrity;
pub mod ledger;
pub mod nonce;
pub mod preflight;
pub mod profile;
pub mod public;
pub mod redaction;
pub mod throttle;

pub use aggregate::{aggregate, Aggregate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{normalize_for_detection, DetectionInput, Detector, DetectorRegistry};
pub use engine::BaneEngine;
pub use error::PolicyError;
pub use escalation::{escalate, Escalation};
pub use finding::{sort_findings, Finding, Severity, Verdict};
pub use input::{AuthContext, EvaluationInput, EvaluationOutput, RequestContext, SessionIntegrity};
pub use integrity::{HmacRequestVerifier, RequestVerifier};
pub use ledger::{RiskLedger, RiskRecord};
pub use nonce::NonceCache;
pub use preflight::DenialCode;
pub use profile::{PolicyHints, FOG_V1};
pub use public::{sanitize_public_message, GENERIC_DENIAL, LOCKOUT_DENIAL, REVIEW_REQUIRED};
pub use redaction::{apply_redactions, redactions_from_findings, RedactionSpan};
pub use throttle::{ThrottleController, ThrottleDecision, ThrottleKey};
