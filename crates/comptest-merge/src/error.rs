//! Error types for merging test documents

use comptest_config::ConfigError;
use comptest_core::Signature;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that abort a single merge
#[derive(Debug, Error)]
pub enum MergeError {
    /// Nothing to merge
    #[error("no components specified")]
    NoComponents,

    /// A component has no test document for the target
    #[error("component '{component}' has no test document {path}")]
    MissingTestDocument { component: String, path: PathBuf },

    /// Failed to load a test document
    #[error(transparent)]
    Load(#[from] ConfigError),

    /// Two components declare the same shared package differently
    #[error("component '{component}' has conflicting config for package '{package}'")]
    PackageConflict { component: String, package: String },

    /// Two components need different variants of one resource kind
    #[error("component '{component}' needs resources '{found}', incompatible with '{baseline}'")]
    IncompatibleResources {
        component: String,
        baseline: Signature,
        found: Signature,
    },

    /// No wrapper base file for a target
    #[error("no build_components_base file for target '{target}'")]
    NoBaseFile { target: String },

    /// Filesystem failure while writing artifacts
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to render a merged document
    #[error("failed to serialize merged document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}
