// profile.rs — Policy profiles.
//
// A profile id selects the hints that shape the pipeline: whether strict
// session integrity is required, whether denials escalate against the
// identity's risk history, and whether critical denials open incidents.
// Unknown profile ids are rejected rather than mapped to something lenient.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// The default production profile.
pub const FOG_V1: &str = "bane_fog_v1";

/// Hints passed to the preflight gate, detectors, and escalation step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyHints {
    /// Require `{nonceOk, signatureOk, tokenFresh}` on every request.
    pub strict_mode: bool,
    /// Feed deny verdicts into the risk ledger.
    pub escalation_enabled: bool,
    /// Write an incident record for enforcement level 5.
    pub incident_on_critical: bool,
}

impl PolicyHints {
    /// Resolve hints for a profile id.
    pub fn for_profile(profile_id: &str) -> Result<Self, PolicyError> {
        match profile_id {
            FOG_V1 => Ok(Self::strict()),
            other => Err(PolicyError::UnknownProfile {
                profile_id: other.to_string(),
            }),
        }
    }

    /// Everything on.
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            escalation_enabled: true,
            incident_on_critical: true,
        }
    }
}

impl Default for PolicyHints {
    fn default() -> Self {
        Self::strict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fog_profile_is_strict() {
        let hints = PolicyHints::for_profile(FOG_V1).unwrap();
        assert!(hints.strict_mode);
        assert!(hints.escalation_enabled);
        assert!(hints.incident_on_critical);
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let err = PolicyHints::for_profile("bane_open_v0").unwrap_err();
        assert!(err.to_string().contains("bane_open_v0"));
    }
}
