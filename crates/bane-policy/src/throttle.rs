// throttle.rs — Advisory backoff for hostile callers.
//
// Independent of the risk ledger: the ledger decides *access* (locks), the
// throttle decides *pacing*. Every denial records a strike against the
// caller's key; the decision after a strike is one of none/delay/block.
//
//   backoff = min(250 · 2^(strikes-1), 8000) ms
//   block   if strikes ≥ 3 and the last two strikes were ≤ 250 ms apart
//   delay   if backoff ≥ 500 ms
//
// Keys idle for longer than `idle_after` (24h by default) are swept at most
// once a minute, so a long-running engine does not accumulate one entry per
// caller it has ever seen.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const BASE_DELAY_MS: u64 = 250;
const MAX_DELAY_MS: u64 = 8_000;
const MIN_REPORTED_DELAY_MS: u64 = 500;
const BURST_WINDOW_MS: i64 = 250;
const BURST_STRIKES: u32 = 3;
pub const BLOCK_RETRY_AFTER_MS: u64 = 15_000;
const SWEEP_INTERVAL_SECS: i64 = 60;

/// How long a key may go without a strike before it is forgotten.
pub fn default_idle_after() -> Duration {
    Duration::hours(24)
}

/// Whose pacing a strike counts against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThrottleKey {
    Identity(String),
    IpHash(String),
    /// Shared bucket for callers with neither identity nor IP hash.
    Anonymous,
}

impl ThrottleKey {
    /// Identity wins over IP hash; empty strings count as absent.
    pub fn from_parts(identity_id: Option<&str>, ip_hash: Option<&str>) -> Self {
        match (
            identity_id.filter(|s| !s.is_empty()),
            ip_hash.filter(|s| !s.is_empty()),
        ) {
            (Some(id), _) => ThrottleKey::Identity(id.to_string()),
            (None, Some(ip)) => ThrottleKey::IpHash(ip.to_string()),
            (None, None) => ThrottleKey::Anonymous,
        }
    }
}

/// Strike history for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleState {
    pub strikes: u32,
    pub last_at: DateTime<Utc>,
    pub prev_at: Option<DateTime<Utc>>,
}

impl ThrottleState {
    pub fn backoff_ms(&self) -> u64 {
        backoff_ms(self.strikes)
    }
}

/// Pacing advice attached to a denial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ThrottleDecision {
    None,
    Delay {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
    },
    Block {
        #[serde(rename = "retryAfterMs")]
        retry_after_ms: u64,
    },
}

impl ThrottleDecision {
    pub fn label(&self) -> &'static str {
        match self {
            ThrottleDecision::None => "none",
            ThrottleDecision::Delay { .. } => "delay",
            ThrottleDecision::Block { .. } => "block",
        }
    }
}

/// `min(250 · 2^(strikes-1), 8000)`; zero strikes means no backoff.
pub fn backoff_ms(strikes: u32) -> u64 {
    if strikes == 0 {
        return 0;
    }
    let shift = (strikes - 1).min(16);
    (BASE_DELAY_MS << shift).min(MAX_DELAY_MS)
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<ThrottleKey, ThrottleState>,
    last_sweep: Option<DateTime<Utc>>,
}

/// Per-key strike history and the pacing advice derived from it.
#[derive(Debug)]
pub struct ThrottleController {
    idle_after: Duration,
    inner: Mutex<Inner>,
}

impl Default for ThrottleController {
    fn default() -> Self {
        Self {
            idle_after: default_idle_after(),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl ThrottleController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget keys with no strike for `idle_after`.
    pub fn with_idle_after(mut self, idle_after: Duration) -> Self {
        self.idle_after = idle_after;
        self
    }

    /// Record one hostile attempt against `key`.
    pub fn note_hostile_attempt(&self, key: &ThrottleKey, now: DateTime<Utc>) -> ThrottleState {
        let mut inner = self.lock();
        self.sweep_idle(&mut inner, now);
        let state = inner
            .states
            .entry(key.clone())
            .and_modify(|s| {
                s.strikes = s.strikes.saturating_add(1);
                s.prev_at = Some(s.last_at);
                s.last_at = now;
            })
            .or_insert(ThrottleState {
                strikes: 1,
                last_at: now,
                prev_at: None,
            });
        state.clone()
    }

    fn sweep_idle(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let due = match inner.last_sweep {
            Some(at) => now - at >= Duration::seconds(SWEEP_INTERVAL_SECS),
            None => true,
        };
        if !due {
            return;
        }
        inner.last_sweep = Some(now);
        let before = inner.states.len();
        let idle_after = self.idle_after;
        inner.states.retain(|_, s| now - s.last_at < idle_after);
        let swept = before - inner.states.len();
        if swept > 0 {
            tracing::debug!(swept, remaining = inner.states.len(), "idle throttle keys swept");
        }
    }

    /// Advice for the next request from `key`.
    ///
    /// A block only stands while `now` is inside its retry window.
    pub fn decide(&self, key: &ThrottleKey, now: DateTime<Utc>) -> ThrottleDecision {
        let inner = self.lock();
        let Some(state) = inner.states.get(key) else {
            return ThrottleDecision::None;
        };

        let burst = state
            .prev_at
            .is_some_and(|prev| state.last_at - prev <= Duration::milliseconds(BURST_WINDOW_MS));
        let block_window_open =
            now - state.last_at < Duration::milliseconds(BLOCK_RETRY_AFTER_MS as i64);
        if state.strikes >= BURST_STRIKES && burst && block_window_open {
            return ThrottleDecision::Block {
                retry_after_ms: BLOCK_RETRY_AFTER_MS,
            };
        }

        match state.backoff_ms() {
            delay_ms if delay_ms >= MIN_REPORTED_DELAY_MS => ThrottleDecision::Delay { delay_ms },
            _ => ThrottleDecision::None,
        }
    }

    /// Record a strike and return the resulting advice.
    pub fn strike(&self, key: &ThrottleKey, now: DateTime<Utc>) -> ThrottleDecision {
        self.note_hostile_attempt(key, now);
        self.decide(key, now)
    }

    pub fn state(&self, key: &ThrottleKey) -> Option<ThrottleState> {
        self.lock().states.get(key).cloned()
    }

    /// Number of keys with recorded strikes.
    pub fn tracked_keys(&self) -> usize {
        self.lock().states.len()
    }

    /// Forget a key's history (operator unlock).
    pub fn reset(&self, key: &ThrottleKey) -> bool {
        self.lock().states.remove(key).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> ThrottleKey {
        ThrottleKey::Identity(id.to_string())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_ms(0), 0);
        assert_eq!(backoff_ms(1), 250);
        assert_eq!(backoff_ms(2), 500);
        assert_eq!(backoff_ms(3), 1000);
        assert_eq!(backoff_ms(6), 8000);
        assert_eq!(backoff_ms(60), 8000);
    }

    #[test]
    fn first_strike_is_none_second_is_delay() {
        let throttle = ThrottleController::new();
        let now = Utc::now();
        assert_eq!(throttle.strike(&key("u"), now), ThrottleDecision::None);
        assert_eq!(
            throttle.strike(&key("u"), now + Duration::seconds(5)),
            ThrottleDecision::Delay { delay_ms: 500 }
        );
    }

    #[test]
    fn rapid_third_strike_blocks() {
        let throttle = ThrottleController::new();
        let now = Utc::now();
        throttle.strike(&key("u"), now);
        throttle.strike(&key("u"), now + Duration::seconds(2));
        let decision = throttle.strike(&key("u"), now + Duration::milliseconds(2_100));
        assert_eq!(
            decision,
            ThrottleDecision::Block {
                retry_after_ms: 15_000
            }
        );
    }

    #[test]
    fn spaced_third_strike_only_delays() {
        let throttle = ThrottleController::new();
        let now = Utc::now();
        throttle.strike(&key("u"), now);
        throttle.strike(&key("u"), now + Duration::seconds(1));
        assert_eq!(
            throttle.strike(&key("u"), now + Duration::seconds(2)),
            ThrottleDecision::Delay { delay_ms: 1000 }
        );
    }

    #[test]
    fn block_lapses_after_retry_window() {
        let throttle = ThrottleController::new();
        let now = Utc::now();
        for _ in 0..3 {
            throttle.note_hostile_attempt(&key("u"), now);
        }
        assert_eq!(throttle.decide(&key("u"), now).label(), "block");
        assert_eq!(
            throttle.decide(&key("u"), now + Duration::seconds(15)).label(),
            "delay"
        );
    }

    #[test]
    fn idle_keys_are_swept() {
        let throttle = ThrottleController::new().with_idle_after(Duration::hours(1));
        let now = Utc::now();
        for i in 0..50 {
            throttle.strike(&ThrottleKey::IpHash(format!("ip-{}", i)), now);
        }
        throttle.strike(&key("regular"), now + Duration::minutes(50));
        assert_eq!(throttle.tracked_keys(), 51);

        // Within the sweep interval nothing is dropped.
        throttle.strike(&key("regular"), now + Duration::minutes(50) + Duration::seconds(30));
        assert_eq!(throttle.tracked_keys(), 51);

        throttle.strike(&key("regular"), now + Duration::minutes(70));
        assert_eq!(throttle.tracked_keys(), 1);
        assert_eq!(throttle.state(&key("regular")).unwrap().strikes, 3);
        assert!(throttle.state(&ThrottleKey::IpHash("ip-0".into())).is_none());
    }

    #[test]
    fn key_falls_back_to_ip_then_anonymous() {
        assert_eq!(
            ThrottleKey::from_parts(Some("u"), Some("ip")),
            ThrottleKey::Identity("u".into())
        );
        assert_eq!(
            ThrottleKey::from_parts(Some(""), Some("ip")),
            ThrottleKey::IpHash("ip".into())
        );
        assert_eq!(ThrottleKey::from_parts(None, None), ThrottleKey::Anonymous);
    }

    #[test]
    fn decision_serializes_with_kind_tag() {
        let json = serde_json::to_value(ThrottleDecision::Block {
            retry_after_ms: 15_000,
        })
        .unwrap();
        assert_eq!(json["kind"], "block");
        assert_eq!(json["retryAfterMs"], 15_000);
    }
}
