// escalation.rs — Strike history → enforcement level.
//
// Rules, in order:
//   critical severity → lock 1 hour, level 5 (strikes unchanged)
//   strikes ≥ 3       → lock 15 minutes, level 4
//   strikes == 2      → level 3
//   strikes == 1      → level 2
// Strikes never decay; only an operator unlock resets them.

use chrono::{DateTime, Duration, Utc};

use crate::finding::Severity;
use crate::ledger::RiskLedger;

/// Lock applied by a single critical denial.
pub fn critical_lock() -> Duration {
    Duration::hours(1)
}

/// Lock applied once strikes reach [`STRIKE_LOCK_THRESHOLD`].
pub fn strike_lock() -> Duration {
    Duration::minutes(15)
}

pub const STRIKE_LOCK_THRESHOLD: u32 = 3;

/// Outcome of escalating one denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    pub level: u8,
    pub strikes: u32,
    /// Set when this escalation (re)locked the identity.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Record a denial against `identity_id` and return the enforcement level.
///
/// The whole read-modify-write happens under the ledger lock.
pub fn escalate(
    ledger: &RiskLedger,
    identity_id: &str,
    severity: Severity,
    now: DateTime<Utc>,
) -> Escalation {
    ledger.update(identity_id, now, |record| {
        record.last_severity = Some(severity);

        if severity == Severity::Critical {
            record.lock_until(now + critical_lock());
            return Escalation {
                level: 5,
                strikes: record.strikes,
                locked_until: record.locked_until,
            };
        }

        record.strikes = record.strikes.saturating_add(1);
        match record.strikes {
            s if s >= STRIKE_LOCK_THRESHOLD => {
                record.lock_until(now + strike_lock());
                Escalation {
                    level: 4,
                    strikes: s,
                    locked_until: record.locked_until,
                }
            }
            2 => Escalation {
                level: 3,
                strikes: 2,
                locked_until: None,
            },
            s => Escalation {
                level: 2,
                strikes: s,
                locked_until: None,
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strikes_escalate_two_three_four() {
        let ledger = RiskLedger::new();
        let now = Utc::now();

        assert_eq!(escalate(&ledger, "u1", Severity::High, now).level, 2);
        assert_eq!(escalate(&ledger, "u1", Severity::High, now).level, 3);

        let third = escalate(&ledger, "u1", Severity::Medium, now);
        assert_eq!(third.level, 4);
        assert_eq!(third.locked_until, Some(now + Duration::minutes(15)));
        assert!(ledger.is_locked("u1", now + Duration::minutes(14)));
        assert!(!ledger.is_locked("u1", now + Duration::minutes(15)));
    }

    #[test]
    fn critical_locks_for_an_hour_without_a_strike() {
        let ledger = RiskLedger::new();
        let now = Utc::now();

        let esc = escalate(&ledger, "u2", Severity::Critical, now);
        assert_eq!(esc.level, 5);
        assert_eq!(esc.strikes, 0);
        assert!(ledger.is_locked("u2", now + Duration::minutes(59)));
        assert!(!ledger.is_locked("u2", now + Duration::hours(1)));
        assert_eq!(
            ledger.get("u2").unwrap().last_severity,
            Some(Severity::Critical)
        );
    }

    #[test]
    fn strikes_do_not_decay_after_lock_expires() {
        let ledger = RiskLedger::new();
        let now = Utc::now();
        for _ in 0..3 {
            escalate(&ledger, "u3", Severity::High, now);
        }
        let later = now + Duration::days(2);
        assert!(!ledger.is_locked("u3", later));
        // Fourth strike, long after: still level 4.
        assert_eq!(escalate(&ledger, "u3", Severity::High, later).level, 4);
    }

    #[test]
    fn identities_are_independent() {
        let ledger = RiskLedger::new();
        let now = Utc::now();
        escalate(&ledger, "a", Severity::High, now);
        escalate(&ledger, "a", Severity::High, now);
        assert_eq!(escalate(&ledger, "b", Severity::High, now).level, 2);
    }
}
