//! Core types for component test grouping
//!
//! This crate provides the vocabulary shared by the rest of the workspace:
//! the target environments used to evaluate auto-loads, the resource
//! [`Signature`] used as a grouping key, and the [`Groupability`] tag
//! assigned to every component.

mod classification;
mod signature;
mod target;

pub use classification::Groupability;
pub use signature::{
    are_compatible, resource_kind, Signature, ISOLATED_SIGNATURE_PREFIX, NO_RESOURCES_SIGNATURE,
    SIGNATURE_SEPARATOR,
};
pub use target::{Framework, Platform, TargetEnvironment, TargetError, CANONICAL_ENVIRONMENTS};

/// Names starting with this prefix are internal and never become graph providers
pub const INTERNAL_NAME_PREFIX: &str = "__";

/// Top-level key holding resource packages in a test document
pub const PACKAGES_KEY: &str = "packages";

/// Top-level key holding substitution variables in a test document
pub const SUBSTITUTIONS_KEY: &str = "substitutions";

/// Top-level device identity section, supplied by the wrapper file
pub const DEVICE_SECTION_KEY: &str = "esphome";

/// Key used to identify list items for deduplication
pub const ID_KEY: &str = "id";

/// Substitution bound to a component's own test directory
pub const COMPONENT_DIR_SUBSTITUTION: &str = "component_dir";
