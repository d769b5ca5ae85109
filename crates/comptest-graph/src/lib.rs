//! Component dependency graph
//!
//! This crate indexes component manifests, builds the provider -> dependent
//! graph from static dependencies and auto-loads, and answers the
//! "what must be retested" question for a set of changed files.
//!
//! # Example
//!
//! ```ignore
//! use comptest_graph::{DependencyGraph, ManifestIndex};
//!
//! let index = ManifestIndex::load(Path::new("components"))?;
//! let graph = DependencyGraph::build(&index);
//! let affected = graph.dependents("mdns");
//! ```

mod error;
mod graph;
mod impact;
mod manifest;

pub use error::{GraphError, GraphResult};
pub use graph::{all_dependencies, DependencyGraph, DEFAULT_MAX_DEPTH};
pub use impact::{ChangeImpact, ImpactAnalyzer};
pub use manifest::{AutoLoad, AutoLoadFn, ComponentManifest, ManifestIndex, PlatformManifest, MANIFEST_FILE};
