//! Unified error types for the Stackline workspace.
//!
//! Structural problems (dangling references, duplicate names) and
//! cross-stack resolution problems are raised while the graph is built or
//! synthesized. Deploy-time problems are only produced by the simulated
//! runtime collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StacklineError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Two resources of the same kind share a name within one scope.
    #[error("duplicate {kind} name: \"{name}\"")]
    Duplicate {
        /// Type of the duplicated resource.
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// A resource refers to another resource that is not declared.
    #[error("{owner} references undeclared {kind} \"{target}\"")]
    DanglingReference {
        /// Resource holding the reference.
        owner: String,
        /// Type of the referenced resource.
        kind: &'static str,
        /// Name of the missing target.
        target: String,
    },

    /// A cross-stack handle could not be resolved.
    #[error("cross-stack resolution failed: {message}")]
    CrossStack {
        /// Description of the resolution failure.
        message: String,
    },

    /// An external collaborator rejected the deployment.
    #[error("deployment failed: {message}")]
    Deploy {
        /// Description of the deploy-time failure.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StacklineError>;
