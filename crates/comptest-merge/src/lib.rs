//! Merging component test documents into grouped builds
//!
//! [`ConfigMerger`] combines the `test.<target>.yaml` documents of several
//! compatible components into one document. Substitutions are renamed per
//! component so they cannot collide, component-specific packages are expanded
//! in place, and the shared resource packages are emitted once.
//! [`ArtifactWriter`] then writes the merged document next to a wrapper built
//! from the target's base file.

mod artifact;
mod error;
mod merger;
mod substitutions;

pub use artifact::{
    device_name, discover_base_files, group_hash, group_name, split_target_version, ArtifactWriter, BaseFile,
    GroupArtifact, COMPONENT_TEST_FILE_PLACEHOLDER,
};
pub use error::{MergeError, MergeResult};
pub use merger::ConfigMerger;
pub use substitutions::{prefix_names, prefix_references, prefix_references_in, references};
