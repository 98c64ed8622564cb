// error.rs — Error types for the BANE gateway.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from configuring the gateway or from refused operator actions.
///
/// Request denials are not errors: guards return them as decisions.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for BaneConfig.
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A setting is present but unusable.
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("policy error: {0}")]
    Policy(#[from] bane_policy::PolicyError),

    #[error("store error: {0}")]
    Store(#[from] bane_audit::StoreError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bane_entitlements::SnapshotError),

    #[error("entitlement error: {0}")]
    Entitlement(#[from] bane_entitlements::EntitlementError),

    /// The caller lacks the operator capability.
    #[error("operator action requires capability '{capability}'")]
    OperatorDenied { capability: String },
}
