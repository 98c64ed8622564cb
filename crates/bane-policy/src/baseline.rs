// baseline.rs — Baseline content-risk detectors.
//
// High-level indicator sets only. Each category maps to a fixed
// severity/verdict pair; the rule content is intentionally simple and
// never surfaces in public messages.

use crate::detector::{DetectionInput, Detector};
use crate::finding::{Finding, Severity, Verdict};
use crate::profile::PolicyHints;
use crate::redaction;

const INTRUSION_HINTS: &[&str] = &[
    "ignore previous",
    "system prompt",
    "developer message",
    "override policy",
    "bypass",
    "jailbreak",
    "disable safety",
    "act as",
];

const EXFIL_HINTS: &[&str] = &[
    "api key",
    "secret",
    "token",
    "password",
    "credentials",
    "private key",
    "dump",
];

const PRIV_ESC_HINTS: &[&str] = &[
    "admin",
    "elevate privilege",
    "root access",
    "operator mode",
    "policy admin",
];

const MALWARE_HINTS: &[&str] = &[
    "malware",
    "ransomware",
    "keylogger",
    "exploit",
    "payload",
    "backdoor",
];

/// Matches normalized text against a fixed list of indicator phrases.
struct IndicatorDetector {
    id: &'static str,
    order: i32,
    needles: &'static [&'static str],
    finding_id: &'static str,
    title: &'static str,
    severity: Severity,
    rationale: &'static str,
    tag: &'static str,
}

impl Detector for IndicatorDetector {
    fn id(&self) -> &str {
        self.id
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn detect(&self, input: &DetectionInput<'_>, _hints: &PolicyHints) -> Vec<Finding> {
        if input.text.is_empty() || !self.needles.iter().any(|n| input.text.contains(n)) {
            return Vec::new();
        }
        vec![Finding::new(
            self.finding_id,
            self.title,
            self.severity,
            Verdict::Deny,
            self.rationale,
        )
        .with_tags(&[self.tag, "baseline"])]
    }
}

/// Flags email- or phone-shaped content for redaction.
struct PiiDetector;

impl Detector for PiiDetector {
    fn id(&self) -> &str {
        "BASE_PII_REVIEW"
    }

    fn order(&self) -> i32 {
        50
    }

    fn detect(&self, input: &DetectionInput<'_>, _hints: &PolicyHints) -> Vec<Finding> {
        // Raw text, not normalized: redaction spans are byte offsets into the
        // raw input, and normalization would change what the patterns see.
        let looks_like_email = redaction::email_regex().is_some_and(|re| re.is_match(input.raw));
        let looks_like_phone = redaction::phone_regex().is_some_and(|re| re.is_match(input.raw));
        if !looks_like_email && !looks_like_phone {
            return Vec::new();
        }

        let evidence = if looks_like_email {
            "email-like pattern"
        } else {
            "phone-like pattern"
        };
        vec![Finding::new(
            "PII_POSSIBLE",
            "Possible personal data detected",
            Severity::Medium,
            Verdict::Sanitize,
            "Input may contain personal contact information; redaction recommended.",
        )
        .with_tags(&["pii", "baseline"])
        .with_evidence(evidence)]
    }
}

/// The five baseline detectors, in no particular order (the registry sorts).
pub fn baseline_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(IndicatorDetector {
            id: "BASE_INTRUSION_LANGUAGE",
            order: 10,
            needles: INTRUSION_HINTS,
            finding_id: "INTRUSION_INDICATOR",
            title: "Intrusion / override indicator detected",
            severity: Severity::High,
            rationale: "Input contains language commonly associated with bypassing controls.",
            tag: "intrusion",
        }),
        Box::new(IndicatorDetector {
            id: "BASE_EXFIL_LANGUAGE",
            order: 20,
            needles: EXFIL_HINTS,
            finding_id: "EXFIL_INDICATOR",
            title: "Potential data exfiltration intent detected",
            severity: Severity::High,
            rationale: "Input suggests an attempt to obtain sensitive credentials or restricted data.",
            tag: "exfil",
        }),
        Box::new(IndicatorDetector {
            id: "BASE_PRIV_ESC_LANGUAGE",
            order: 30,
            needles: PRIV_ESC_HINTS,
            finding_id: "PRIV_ESC_INDICATOR",
            title: "Privilege escalation indicator detected",
            severity: Severity::High,
            rationale: "Input indicates an attempt to access privileged operator/admin actions.",
            tag: "privilege",
        }),
        Box::new(IndicatorDetector {
            id: "BASE_MALWARE_LANGUAGE",
            order: 40,
            needles: MALWARE_HINTS,
            finding_id: "MALWARE_INDICATOR",
            title: "Malicious content indicator detected",
            severity: Severity::Critical,
            rationale: "Input contains terms commonly associated with malware/exploit activity.",
            tag: "malware",
        }),
        Box::new(PiiDetector),
    ]
}
