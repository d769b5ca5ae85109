//! Error types for manifest loading and graph construction

use comptest_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that abort manifest indexing or graph construction
#[derive(Debug, Error)]
pub enum GraphError {
    /// Failed to list the components directory
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to read a manifest file
    #[error("failed to read manifest {path}: {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid
    #[error("failed to parse manifest {path}: {source}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A component name was registered twice
    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    /// A platform manifest names a component that is not registered
    #[error("component '{0}' is not registered")]
    UnknownComponent(String),
}
