//! # bane-entitlements
//!
//! Capability entitlements and signed offline policy snapshots.
//!
//! An [`Entitlement`] grants one identity one key in one org at a [`Stage`].
//! [`evaluate_entitlement`] decides whether a request is covered, either
//! online from the entitlement itself or offline from a [`VerifiedSnapshot`].
//! The [`EntitlementRegistry`] issues, renews and revokes entitlements and
//! signs per-identity [`PolicySnapshot`]s.
//!
//! ## Key invariants
//!
//! - Offline decisions accept only a [`VerifiedSnapshot`]; the only way to get
//!   one is [`SnapshotKeyring::verify`] (or its `_str`/`_value` forms).
//! - Offline hard-deny constraints win over any entitlement.
//! - Entitlements are never deleted. Every mutation bumps `policy_version`
//!   and appends an event.
//! - Evaluation takes `now` as an argument and has no other inputs.
//!
//! ## Quick Example
//!
//! ```rust
//! use chrono::Utc;
//! use bane_entitlements::{
//!     evaluate_entitlement, DecisionReason, EntitlementRegistry, EntitlementRequest,
//!     IssueRequest, SnapshotKeyring, SnapshotSigner,
//! };
//!
//! let now = Utc::now();
//! let registry = EntitlementRegistry::new();
//! registry.set_member("org-1", "admin-1", "admin");
//! registry.set_member("org-1", "user-1", "inspector");
//! registry
//!     .issue("admin-1", &IssueRequest::new("org-1", "user-1", "vision"), now)
//!     .unwrap();
//!
//! let signer = SnapshotSigner::new("k1", b"org-secret").unwrap();
//! let snapshot = registry.issue_snapshot("org-1", "user-1", &signer, now).unwrap();
//!
//! let mut keyring = SnapshotKeyring::new();
//! keyring.insert("org-1", "k1", b"org-secret").unwrap();
//! let verified = keyring.verify(&snapshot).unwrap();
//!
//! let request = EntitlementRequest::new("user-1", "org-1", "vision").offline();
//! let decision = evaluate_entitlement(&request, Some(&verified), None, now);
//! assert!(decision.allow);
//! assert_eq!(decision.reason, DecisionReason::Ok);
//! ```

pub mod catalog;
pub mod entitlement;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod snapshot;

pub use catalog::{KeyCatalog, KeyDefaults};
pub use entitlement::{entitlement_id, Entitlement, EntitlementStatus, Stage};
pub use error::{EntitlementError, SnapshotError};
pub use evaluator::{evaluate_entitlement, DecisionReason, EntitlementDecision, EntitlementRequest};
pub use registry::{
    EntitlementRegistry, IssueRequest, MutationReceipt, RevokeRequest, DEFAULT_ENTITLEMENT_DAYS,
    DEFAULT_REVOKE_REASON, MAX_ENTITLEMENT_DAYS,
};
pub use snapshot::{
    canonical_json, compute_snapshot_hash, PolicyConstraints, PolicySnapshot, SnapshotKeyring,
    SnapshotSignature, SnapshotSigner, UnsignedSnapshot, VerifiedSnapshot,
    DEFAULT_MAX_OFFLINE_SECONDS, SIGNATURE_ALG,
};
