// sink.rs — Fire-and-forget delivery of records to a store.
//
// Persistence is a side channel: a store that errors, panics, or is slow
// must never change, delay, or fail a decision. Background mode (the
// default for engines) hands records to a dedicated worker over a bounded
// queue; when the queue is full the record is dropped and counted instead of
// blocking the caller. Inline mode writes on the caller's thread and
// swallows failures.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::StoreError;
use crate::record::{AuditRecord, EventRecord, IncidentRecord};
use crate::store::BaneStore;

/// Records the background queue holds before new ones are dropped.
pub const DEFAULT_SINK_QUEUE: usize = 1024;

/// How long [`AuditSink::flush`] waits for the worker to drain.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum SinkRecord {
    Audit(AuditRecord),
    Event(EventRecord),
    Incident(IncidentRecord),
    /// Acknowledged once everything queued before it has been delivered.
    Flush(mpsc::Sender<()>),
}

enum SinkMode {
    Disabled,
    Inline,
    Background(SyncSender<SinkRecord>),
}

/// Best-effort writer in front of a [`BaneStore`].
pub struct AuditSink {
    store: Option<Arc<dyn BaneStore>>,
    mode: SinkMode,
    dropped: AtomicU64,
}

impl AuditSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            mode: SinkMode::Disabled,
            dropped: AtomicU64::new(0),
        }
    }

    /// Write synchronously, discarding failures.
    pub fn inline(store: Arc<dyn BaneStore>) -> Self {
        Self {
            store: Some(store),
            mode: SinkMode::Inline,
            dropped: AtomicU64::new(0),
        }
    }

    /// Write from a worker thread with a queue of [`DEFAULT_SINK_QUEUE`].
    pub fn background(store: Arc<dyn BaneStore>) -> Self {
        Self::background_with_capacity(store, DEFAULT_SINK_QUEUE)
    }

    /// Write from a worker thread, queueing at most `capacity` records
    /// (minimum 1). Falls back to inline mode if the worker cannot be
    /// spawned.
    pub fn background_with_capacity(store: Arc<dyn BaneStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<SinkRecord>(capacity.max(1));
        let worker_store = Arc::clone(&store);
        let spawned = thread::Builder::new()
            .name("bane-audit-sink".to_string())
            .spawn(move || {
                for record in rx {
                    match record {
                        SinkRecord::Flush(ack) => {
                            let _ = ack.send(());
                        }
                        record => deliver(worker_store.as_ref(), record),
                    }
                }
            });

        match spawned {
            Ok(_) => Self {
                store: Some(store),
                mode: SinkMode::Background(tx),
                dropped: AtomicU64::new(0),
            },
            Err(e) => {
                tracing::warn!("audit sink worker unavailable, writing inline: {}", e);
                Self::inline(store)
            }
        }
    }

    /// The store behind this sink, for read paths (operator listings).
    pub fn store(&self) -> Option<&Arc<dyn BaneStore>> {
        self.store.as_ref()
    }

    /// Records discarded because the queue was full or the worker had
    /// stopped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn record_audit(&self, record: AuditRecord) {
        self.submit(SinkRecord::Audit(record));
    }

    pub fn record_event(&self, event: EventRecord) {
        self.submit(SinkRecord::Event(event));
    }

    pub fn record_incident(&self, incident: IncidentRecord) {
        self.submit(SinkRecord::Incident(incident));
    }

    /// Block until every record queued so far has been delivered, or
    /// [`FLUSH_TIMEOUT`] passes. Returns whether the queue drained.
    ///
    /// For shutdown and read paths only. Never call this on a decision path.
    pub fn flush(&self) -> bool {
        let SinkMode::Background(tx) = &self.mode else {
            return true;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(SinkRecord::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(FLUSH_TIMEOUT).is_ok()
    }

    fn submit(&self, record: SinkRecord) {
        match &self.mode {
            SinkMode::Disabled => {}
            SinkMode::Inline => {
                if let Some(store) = &self.store {
                    deliver(store.as_ref(), record);
                }
            }
            SinkMode::Background(tx) => match tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(dropped, "audit sink queue full; record dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("audit sink worker has stopped; record dropped");
                }
            },
        }
    }
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::disabled()
    }
}

fn deliver(store: &dyn BaneStore, record: SinkRecord) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &record {
        SinkRecord::Audit(r) => store.append_audit(r),
        SinkRecord::Event(e) => store.append_event(e),
        SinkRecord::Incident(i) => store.append_incident(i),
        SinkRecord::Flush(ack) => {
            let _ = ack.send(());
            Ok(())
        }
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(StoreError::Unsupported(what))) => {
            tracing::debug!("store does not support {}; record skipped", what);
        }
        Ok(Err(e)) => tracing::warn!("audit store write failed: {}", e),
        Err(_) => tracing::warn!("audit store panicked during write; record dropped"),
    }
}
