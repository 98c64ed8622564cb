// public.rs — Caller-facing messages.
//
// Every message that leaves the engine passes through
// `sanitize_public_message`. If it mentions any internal vocabulary it is
// replaced wholesale with the generic denial, so a future overly descriptive
// message cannot leak how decisions are made.

use crate::finding::Verdict;

pub const GENERIC_DENIAL: &str =
    "Request denied: unauthorized or unsafe operation. This attempt has been logged.";
pub const LOCKOUT_DENIAL: &str =
    "Access revoked temporarily due to policy violations. Contact an authorized administrator.";
pub const REVIEW_REQUIRED: &str =
    "Request restricted by policy. Additional authorization is required.";

const FORBIDDEN_FRAGMENTS: &[&str] = &[
    "system prompt",
    "developer message",
    "detector",
    "regex",
    "pattern",
    "rule",
    "threshold",
    "policy id",
];

/// Replace `message` with [`GENERIC_DENIAL`] if it contains internal vocabulary.
pub fn sanitize_public_message(message: &str) -> String {
    if is_public_safe(message) {
        message.to_string()
    } else {
        GENERIC_DENIAL.to_string()
    }
}

/// The message for a decision, or `None` for allow/sanitize.
pub fn public_message_for(verdict: Verdict, enforcement_level: u8) -> Option<&'static str> {
    match verdict {
        Verdict::Deny if enforcement_level >= 4 => Some(LOCKOUT_DENIAL),
        Verdict::Deny => Some(GENERIC_DENIAL),
        Verdict::Review => Some(REVIEW_REQUIRED),
        Verdict::Allow | Verdict::Sanitize => None,
    }
}

/// True if `message` would survive sanitization unchanged.
pub fn is_public_safe(message: &str) -> bool {
    let lowered = message.to_lowercase();
    !FORBIDDEN_FRAGMENTS.iter().any(|f| lowered.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_messages_are_replaced() {
        for msg in [
            "Blocked by the INTRUSION detector",
            "matched Regex #4",
            "System Prompt access denied",
            "over threshold",
            "Policy ID bane_fog_v1",
            "rule 7 fired",
        ] {
            assert_eq!(sanitize_public_message(msg), GENERIC_DENIAL, "{}", msg);
        }
    }

    #[test]
    fn clean_messages_pass_through() {
        assert_eq!(sanitize_public_message("Hello"), "Hello");
    }

    #[test]
    fn fixed_messages_are_themselves_safe() {
        for msg in [GENERIC_DENIAL, LOCKOUT_DENIAL, REVIEW_REQUIRED] {
            assert!(is_public_safe(msg), "{}", msg);
        }
    }

    #[test]
    fn message_selection() {
        assert_eq!(public_message_for(Verdict::Deny, 5), Some(LOCKOUT_DENIAL));
        assert_eq!(public_message_for(Verdict::Deny, 4), Some(LOCKOUT_DENIAL));
        assert_eq!(public_message_for(Verdict::Deny, 3), Some(GENERIC_DENIAL));
        assert_eq!(public_message_for(Verdict::Review, 2), Some(REVIEW_REQUIRED));
        assert_eq!(public_message_for(Verdict::Sanitize, 1), None);
        assert_eq!(public_message_for(Verdict::Allow, 0), None);
    }
}
