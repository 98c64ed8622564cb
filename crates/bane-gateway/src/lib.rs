//! # bane-gateway
//!
//! Adapters that put the BANE engine in front of real traffic.
//!
//! - [`HttpGuard`] turns an HTTP request into an evaluation and maps the
//!   decision to a status code and headers.
//! - [`ToolGuard`] and [`run_guarded_tool`] gate tool invocations on a
//!   capability and run the tool body only on allow.
//! - [`OperatorConsole`] is the operator control plane: list records,
//!   force-lock and force-unlock identities.
//! - [`BaneConfig`] loads `.bane/config.toml` and builds the engine, store,
//!   and snapshot keys from it.
//!
//! None of these depend on a particular web framework.

pub mod config;
pub mod error;
pub mod http;
pub mod operator;
pub mod tool;

pub use config::{BaneConfig, SnapshotKeyConfig, StoreConfig, StoreKind, MAX_NONCE_TTL_SECS};
pub use error::GatewayError;
pub use http::{
    caps_for_role, decision_for, resolve_capabilities, status_for, HttpDecision, HttpGuard,
    HttpRequest,
};
pub use operator::{
    clamp_lock_ttl, lock_ttl_from_secs, OperatorConsole, DEFAULT_OPERATOR_CAPABILITY,
    MAX_FORCE_LOCK_SECS, MIN_FORCE_LOCK_SECS,
};
pub use tool::{run_guarded_tool, ToolCall, ToolDecision, ToolGuard, ToolOutcome};
