//! # bane-audit
//!
//! Side-channel persistence for the BANE enforcement engine.
//!
//! Every decision the engine makes is summarized as an [`AuditRecord`];
//! security-relevant state changes (lockouts, entitlement issuance, operator
//! actions) become [`EventRecord`]s, and critical denials become
//! [`IncidentRecord`]s. Records are handed to a [`BaneStore`] through an
//! [`AuditSink`], which never lets a storage failure reach the caller.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bane_audit::{AuditSink, EventKind, EventRecord, InMemoryStore};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let sink = AuditSink::inline(store.clone());
//! sink.record_event(EventRecord::new(EventKind::IdentityLocked).with_target("user-1"));
//! assert_eq!(store.events().len(), 1);
//! ```

pub mod error;
pub mod hasher;
pub mod jsonl;
pub mod record;
pub mod sink;
pub mod store;

pub use error::StoreError;
pub use jsonl::JsonlStore;
pub use record::{AuditRecord, EventKind, EventRecord, IncidentRecord};
pub use sink::{AuditSink, DEFAULT_SINK_QUEUE};
pub use store::{BaneStore, InMemoryStore};
