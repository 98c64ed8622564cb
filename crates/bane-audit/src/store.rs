// store.rs — The pluggable store contract and an in-memory implementation.
//
// The engine only needs audits and events; incidents are optional and
// default to `Unsupported`. Any durable backend (document DB, relational,
// JSONL on disk) satisfies the contract by implementing this trait.

use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::record::{AuditRecord, EventRecord, IncidentRecord};

/// Persistence contract for BANE records.
///
/// Implementations use interior mutability so one store can be shared by
/// the engine, the operator control plane, and the entitlement registry.
pub trait BaneStore: Send + Sync {
    fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    fn append_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// Most recent audits first, at most `limit`.
    fn recent_audits(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError>;

    fn append_incident(&self, _incident: &IncidentRecord) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("incidents"))
    }

    /// Most recent incidents first, at most `limit`.
    fn recent_incidents(&self, _limit: usize) -> Result<Vec<IncidentRecord>, StoreError> {
        Err(StoreError::Unsupported("incidents"))
    }

    fn incident_by_trace(&self, _trace_id: &str) -> Result<Option<IncidentRecord>, StoreError> {
        Err(StoreError::Unsupported("incidents"))
    }
}

/// Process-local store backed by vectors. Used in tests and single-node setups.
#[derive(Default)]
pub struct InMemoryStore {
    audits: Mutex<Vec<AuditRecord>>,
    events: Mutex<Vec<EventRecord>>,
    incidents: Mutex<Vec<IncidentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all audits, oldest first.
    pub fn audits(&self) -> Vec<AuditRecord> {
        lock(&self.audits).clone()
    }

    /// Snapshot of all events, oldest first.
    pub fn events(&self) -> Vec<EventRecord> {
        lock(&self.events).clone()
    }

    /// Snapshot of all incidents, oldest first.
    pub fn incidents(&self) -> Vec<IncidentRecord> {
        lock(&self.incidents).clone()
    }
}

impl BaneStore for InMemoryStore {
    fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        lock(&self.audits).push(record.clone());
        Ok(())
    }

    fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(newest_first(&lock(&self.audits), limit))
    }

    fn append_incident(&self, incident: &IncidentRecord) -> Result<(), StoreError> {
        lock(&self.incidents).push(incident.clone());
        Ok(())
    }

    fn recent_incidents(&self, limit: usize) -> Result<Vec<IncidentRecord>, StoreError> {
        Ok(newest_first(&lock(&self.incidents), limit))
    }

    fn incident_by_trace(&self, trace_id: &str) -> Result<Option<IncidentRecord>, StoreError> {
        Ok(lock(&self.incidents)
            .iter()
            .find(|i| i.trace_id == trace_id)
            .cloned())
    }
}

/// Take the last `limit` items in reverse order (newest first).
pub(crate) fn newest_first<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

// A poisoned vector is still a valid vector; keep serving it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
