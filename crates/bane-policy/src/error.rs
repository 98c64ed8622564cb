// error.rs — Error types for the enforcement pipeline.
//
// Security denials are never errors: they come back as EvaluationOutput.
// These variants cover misconfiguration discovered while building an engine.

use thiserror::Error;

/// Errors that can occur while configuring the enforcement engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The requested policy profile does not exist.
    #[error("unknown policy profile '{profile_id}'")]
    UnknownProfile { profile_id: String },

    /// A signing secret was empty.
    #[error("request signing secret must not be empty")]
    EmptySigningSecret,

    /// Two detectors were registered under the same id.
    #[error("detector '{id}' is already registered")]
    DuplicateDetector { id: String },
}
