//! Change-impact analysis
//!
//! Maps a list of changed files to the components whose tests must run.

use crate::graph::DependencyGraph;
use crate::manifest::ManifestIndex;
use comptest_config::ToolSettings;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Components affected by a set of changed files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeImpact {
    /// Components owning one of the changed files
    pub changed: BTreeSet<String>,
    /// Changed components plus, when requested, their dependents
    pub affected: BTreeSet<String>,
    /// A shared test fixture changed, so every component is affected
    pub all_components: bool,
}

impl ChangeImpact {
    /// Affected component names, sorted
    pub fn components(&self) -> Vec<String> {
        self.affected.iter().cloned().collect()
    }
}

/// Resolves changed paths against the repository layout
pub struct ImpactAnalyzer<'a> {
    index: &'a ManifestIndex,
    graph: &'a DependencyGraph,
    root: PathBuf,
    components_dir: PathBuf,
    tests_dir: PathBuf,
    shared_dir: PathBuf,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(
        index: &'a ManifestIndex,
        graph: &'a DependencyGraph,
        root: &Path,
        settings: &ToolSettings,
    ) -> Self {
        Self {
            index,
            graph,
            root: normalize(root),
            components_dir: normalize(&settings.components_dir),
            tests_dir: normalize(&settings.tests_dir),
            shared_dir: normalize(&settings.build_components_dir),
        }
    }

    /// Component a changed file belongs to, if any
    ///
    /// Relative paths are taken relative to the repository root.
    pub fn component_of(&self, path: &Path) -> Option<String> {
        let path = self.absolute(path);

        if let Some(name) = component_dir_name(&path, &self.components_dir) {
            if !self.index.contains(&name) {
                debug!("Skipping {:?}: no manifest for component {}", path, name);
                return None;
            }
            return Some(name);
        }
        component_dir_name(&path, &self.tests_dir)
    }

    /// Analyze changed files
    pub fn analyze<P: AsRef<Path>>(&self, changed_files: &[P], include_dependents: bool) -> ChangeImpact {
        let mut impact = ChangeImpact::default();

        for file in changed_files {
            let path = self.absolute(file.as_ref());
            if path.starts_with(&self.shared_dir) && !path.starts_with(&self.tests_dir) {
                debug!("Shared test fixture changed: {:?}", file.as_ref());
                impact.all_components = true;
                continue;
            }
            if let Some(name) = self.component_of(&path) {
                impact.changed.insert(name);
            }
        }

        if impact.all_components {
            impact.affected = self.index.names().map(str::to_string).collect();
            impact.affected.extend(impact.changed.iter().cloned());
        } else {
            impact.affected = impact.changed.clone();
            if include_dependents {
                for name in &impact.changed {
                    impact.affected.extend(self.graph.dependents(name));
                }
            }
        }

        info!(
            "{} changed files affect {} components",
            changed_files.len(),
            impact.affected.len()
        );
        impact
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        }
    }
}

/// Name of the directory directly below `base` that contains `path`
///
/// Files sitting directly in `base` belong to no directory and yield `None`.
fn component_dir_name(path: &Path, base: &Path) -> Option<String> {
    let rest = path.strip_prefix(base).ok()?;
    if rest.components().count() < 2 {
        return None;
    }
    match rest.components().next()? {
        Component::Normal(segment) => segment.to_str().map(str::to_string),
        _ => None,
    }
}

/// Lexically drop `.` segments and fold `..`, without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
