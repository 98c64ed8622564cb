// operator.rs — Operator control plane.
//
// Every action requires an authenticated caller holding the operator
// capability. Lock and unlock mutate the engine's risk ledger directly and
// append an event naming the operator.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use bane_audit::{AuditRecord, EventKind, EventRecord, IncidentRecord};
use bane_policy::{AuthContext, BaneEngine};

use crate::error::GatewayError;

/// Capability an operator must hold when none is configured.
pub const DEFAULT_OPERATOR_CAPABILITY: &str = "bane:operator";

/// Shortest force-lock, in seconds.
pub const MIN_FORCE_LOCK_SECS: i64 = 5;

/// Longest force-lock, in seconds (24 hours).
pub const MAX_FORCE_LOCK_SECS: i64 = 24 * 60 * 60;

pub fn min_force_lock() -> Duration {
    Duration::seconds(MIN_FORCE_LOCK_SECS)
}

pub fn max_force_lock() -> Duration {
    Duration::seconds(MAX_FORCE_LOCK_SECS)
}

/// Clamp a requested lock duration to 5 seconds .. 24 hours.
pub fn clamp_lock_ttl(requested: Duration) -> Duration {
    requested.clamp(min_force_lock(), max_force_lock())
}

/// Clamp a raw second count (as received on the wire) before it becomes a
/// `Duration`. Any `i64` is accepted.
pub fn lock_ttl_from_secs(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(MIN_FORCE_LOCK_SECS, MAX_FORCE_LOCK_SECS))
}

/// Authorized operator actions against a live engine.
pub struct OperatorConsole {
    engine: Arc<BaneEngine>,
    capability: String,
}

impl OperatorConsole {
    /// A console requiring [`DEFAULT_OPERATOR_CAPABILITY`].
    pub fn new(engine: Arc<BaneEngine>) -> Self {
        Self {
            engine,
            capability: DEFAULT_OPERATOR_CAPABILITY.to_string(),
        }
    }

    /// Require `capability` instead of [`DEFAULT_OPERATOR_CAPABILITY`].
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    fn authorize<'a>(&self, actor: &'a AuthContext) -> Result<&'a str, GatewayError> {
        match actor.authenticated_identity() {
            Some(id) if actor.has_capability(&self.capability) => Ok(id),
            _ => {
                tracing::warn!(
                    actor = actor.identity_id.as_deref().unwrap_or("-"),
                    "operator action refused"
                );
                Err(GatewayError::OperatorDenied {
                    capability: self.capability.clone(),
                })
            }
        }
    }

    fn flush_pending(&self) {
        if !self.engine.sink().flush() {
            tracing::warn!("audit sink did not drain before an operator listing");
        }
    }

    /// Newest-first decisions from the engine's store. Pending background
    /// writes are flushed first.
    pub fn recent_audits(&self, actor: &AuthContext, limit: usize) -> Result<Vec<AuditRecord>, GatewayError> {
        self.authorize(actor)?;
        self.flush_pending();
        match self.engine.sink().store() {
            Some(store) => Ok(store.recent_audits(limit)?),
            None => Ok(Vec::new()),
        }
    }

    /// Newest-first incidents from the engine's store.
    pub fn recent_incidents(
        &self,
        actor: &AuthContext,
        limit: usize,
    ) -> Result<Vec<IncidentRecord>, GatewayError> {
        self.authorize(actor)?;
        self.flush_pending();
        match self.engine.sink().store() {
            Some(store) => Ok(store.recent_incidents(limit)?),
            None => Ok(Vec::new()),
        }
    }

    /// Like [`force_lock`](Self::force_lock), for a raw second count. The
    /// caller is authorized before the count is looked at.
    pub fn force_lock_secs(
        &self,
        actor: &AuthContext,
        identity_id: &str,
        ttl_seconds: i64,
    ) -> Result<DateTime<Utc>, GatewayError> {
        self.authorize(actor)?;
        self.force_lock(actor, identity_id, lock_ttl_from_secs(ttl_seconds))
    }

    /// Lock `identity_id` for `ttl`, clamped. Returns the lock expiry.
    pub fn force_lock(
        &self,
        actor: &AuthContext,
        identity_id: &str,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, GatewayError> {
        let operator = self.authorize(actor)?;
        let now = self.engine.now();
        let ttl = clamp_lock_ttl(ttl);
        let until = now + ttl;
        let before = self.engine.ledger().get(identity_id);
        self.engine.lock_identity(identity_id, until);

        tracing::warn!(
            operator = %operator,
            identity_id = %identity_id,
            ttl_secs = ttl.num_seconds(),
            "operator force-locked identity"
        );
        let mut event = EventRecord::new(EventKind::OperatorForceLock)
            .at(now)
            .with_actor(operator)
            .with_target(identity_id)
            .with_after(json!({ "lockedUntil": until, "ttlSeconds": ttl.num_seconds() }));
        if let Some(before) = before {
            event = event.with_before(json!({
                "strikes": before.strikes,
                "lockedUntil": before.locked_until,
            }));
        }
        self.engine.sink().record_event(event);
        Ok(until)
    }

    /// Clear lock, strikes, and throttle history. Returns whether the
    /// identity had any state.
    pub fn force_unlock(&self, actor: &AuthContext, identity_id: &str) -> Result<bool, GatewayError> {
        let operator = self.authorize(actor)?;
        let before = self.engine.ledger().get(identity_id);
        let had_state = self.engine.unlock_identity(identity_id);

        tracing::info!(
            operator = %operator,
            identity_id = %identity_id,
            had_state,
            "operator unlocked identity"
        );
        let mut event = EventRecord::new(EventKind::OperatorForceUnlock)
            .at(self.engine.now())
            .with_actor(operator)
            .with_target(identity_id)
            .with_after(json!({ "strikes": 0, "lockedUntil": null }));
        if let Some(before) = before {
            event = event.with_before(json!({
                "strikes": before.strikes,
                "lockedUntil": before.locked_until,
            }));
        }
        self.engine.sink().record_event(event);
        Ok(had_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bane_audit::InMemoryStore;
    use bane_policy::{Clock, EvaluationInput, ManualClock, SessionIntegrity, Verdict, FOG_V1};

    fn setup() -> (OperatorConsole, Arc<BaneEngine>, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = Arc::new(
            BaneEngine::new(FOG_V1)
                .unwrap()
                .with_clock(clock.clone())
                .with_store(store.clone()),
        );
        (OperatorConsole::new(engine.clone()), engine, store, clock)
    }

    fn operator() -> AuthContext {
        AuthContext::new("ops-1").with_capabilities([DEFAULT_OPERATOR_CAPABILITY])
    }

    fn user_request(id: &str) -> EvaluationInput {
        EvaluationInput::new("hello", "/api/bane").with_auth(
            AuthContext::new(id)
                .with_capabilities(["bane:invoke"])
                .with_integrity(SessionIntegrity::verified()),
        )
    }

    #[test]
    fn clamps_lock_duration() {
        assert_eq!(clamp_lock_ttl(Duration::seconds(1)), Duration::seconds(5));
        assert_eq!(clamp_lock_ttl(Duration::days(3)), Duration::hours(24));
        assert_eq!(clamp_lock_ttl(Duration::minutes(30)), Duration::minutes(30));
        assert_eq!(clamp_lock_ttl(Duration::seconds(-10)), Duration::seconds(5));
    }

    #[test]
    fn raw_second_counts_are_clamped_before_conversion() {
        assert_eq!(lock_ttl_from_secs(i64::MAX), Duration::hours(24));
        assert_eq!(lock_ttl_from_secs(i64::MIN), Duration::seconds(5));
        assert_eq!(lock_ttl_from_secs(90), Duration::seconds(90));
    }

    #[test]
    fn raw_lock_is_authorized_first() {
        let (console, engine, _, clock) = setup();
        assert!(matches!(
            console.force_lock_secs(&AuthContext::default(), "u2", i64::MAX),
            Err(GatewayError::OperatorDenied { .. })
        ));
        assert!(!engine.ledger().is_locked("u2", engine.now()));

        let until = console.force_lock_secs(&operator(), "u2", i64::MAX).unwrap();
        assert_eq!(until, clock.now() + Duration::hours(24));
    }

    #[test]
    fn non_operators_are_refused() {
        let (console, engine, store, _) = setup();
        let plain = AuthContext::new("u1").with_capabilities(["bane:invoke"]);
        assert!(matches!(
            console.force_lock(&plain, "u2", Duration::minutes(5)),
            Err(GatewayError::OperatorDenied { .. })
        ));
        let mut unauthenticated = operator();
        unauthenticated.authenticated = false;
        assert!(console.recent_audits(&unauthenticated, 5).is_err());
        assert!(!engine.ledger().is_locked("u2", engine.now()));
        assert!(store.events().is_empty());
    }

    #[test]
    fn force_lock_then_unlock() {
        let (console, engine, store, clock) = setup();
        let until = console
            .force_lock(&operator(), "u1", Duration::seconds(2))
            .unwrap();
        assert_eq!(until, clock.now() + Duration::seconds(5));
        assert_eq!(engine.evaluate(&user_request("u1")).verdict, Verdict::Deny);

        assert!(console.force_unlock(&operator(), "u1").unwrap());
        assert_eq!(engine.evaluate(&user_request("u1")).verdict, Verdict::Allow);
        assert!(engine.sink().flush());

        let kinds: Vec<EventKind> = store.events().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::OperatorForceLock));
        assert!(kinds.contains(&EventKind::OperatorForceUnlock));
        let lock_event = store
            .events()
            .into_iter()
            .find(|e| e.kind == EventKind::OperatorForceLock)
            .unwrap();
        assert_eq!(lock_event.actor_id.as_deref(), Some("ops-1"));
        assert_eq!(lock_event.after.unwrap()["ttlSeconds"], 5);
    }

    #[test]
    fn lists_audits_and_incidents() {
        let (console, engine, _, _) = setup();
        engine.evaluate(&user_request("u1"));
        let malware = EvaluationInput::new("ship the ransomware", "/api/bane").with_auth(
            AuthContext::new("u3")
                .with_capabilities(["bane:invoke"])
                .with_integrity(SessionIntegrity::verified()),
        );
        let out = engine.evaluate(&malware);

        let audits = console.recent_audits(&operator(), 10).unwrap();
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[0].trace_id, out.trace_id);

        let incidents = console.recent_incidents(&operator(), 10).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].identity_id.as_deref(), Some("u3"));
    }
}
