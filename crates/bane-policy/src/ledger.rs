// ledger.rs — Per-identity risk ledger.
//
// The ledger maps identity id → RiskRecord behind a single mutex. Every
// read-modify-write goes through `update`, which holds the lock for the whole
// closure, so concurrent denials from one identity never lose a strike.
// Records are created lazily on first strike and are only removed by an
// operator unlock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::finding::Severity;

/// Risk standing for one identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RiskRecord {
    pub identity_id: String,
    pub strikes: u32,
    pub last_severity: Option<Severity>,
    pub last_seen: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl RiskRecord {
    fn new(identity_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            strikes: 0,
            last_severity: None,
            last_seen: now,
            locked_until: None,
        }
    }

    /// Locked iff `now < locked_until`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Extend the lock to at least `until`; never shortens an existing lock.
    pub fn lock_until(&mut self, until: DateTime<Utc>) {
        self.locked_until = Some(match self.locked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }
}

/// Concurrency-safe store of risk records.
#[derive(Debug, Default)]
pub struct RiskLedger {
    records: Mutex<HashMap<String, RiskRecord>>,
}

impl RiskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, identity_id: &str, now: DateTime<Utc>) -> bool {
        self.lock()
            .get(identity_id)
            .is_some_and(|r| r.is_locked(now))
    }

    pub fn get(&self, identity_id: &str) -> Option<RiskRecord> {
        self.lock().get(identity_id).cloned()
    }

    /// Atomically mutate (creating if needed) the record for `identity_id`.
    pub fn update<R>(
        &self,
        identity_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut RiskRecord) -> R,
    ) -> R {
        let mut records = self.lock();
        let record = records
            .entry(identity_id.to_string())
            .or_insert_with(|| RiskRecord::new(identity_id, now));
        record.last_seen = now;
        f(record)
    }

    /// Lock an identity until `until` regardless of strike history.
    pub fn force_lock(&self, identity_id: &str, until: DateTime<Utc>, now: DateTime<Utc>) {
        self.update(identity_id, now, |r| {
            // Operator locks replace the window outright, even if shorter.
            r.locked_until = Some(until);
        });
    }

    /// Clear lock and strikes. Returns whether a record existed.
    pub fn unlock(&self, identity_id: &str) -> bool {
        self.lock().remove(identity_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RiskRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}
