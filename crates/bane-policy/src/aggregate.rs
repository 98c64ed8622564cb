// aggregate.rs — Reduce findings to a single verdict and severity.
//
// Severity and verdict are maximized independently: they need not come from
// the same finding.

use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity, Verdict};

/// The pipeline's overall classification of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Aggregate {
    pub verdict: Verdict,
    pub severity: Severity,
}

/// `{allow, low}` for no findings, otherwise the per-field maximum.
pub fn aggregate(findings: &[Finding]) -> Aggregate {
    Aggregate {
        verdict: findings
            .iter()
            .map(|f| f.verdict)
            .max()
            .unwrap_or(Verdict::Allow),
        severity: findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low),
    }
}
