//! Merging several component test documents into one

use crate::error::{MergeError, MergeResult};
use crate::substitutions::{prefix_names, prefix_references, references};
use comptest_config::{deduplicate_by_id, load_yaml, merge_config, Mapping, ToolSettings, Value};
use comptest_core::{
    Signature, COMPONENT_DIR_SUBSTITUTION, DEVICE_SECTION_KEY, PACKAGES_KEY, SUBSTITUTIONS_KEY,
};
use comptest_grouping::{DeclaredPackages, PackageCatalog};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Merges the `test.<target>.yaml` documents of several components
#[derive(Debug, Clone)]
pub struct ConfigMerger {
    tests_dir: PathBuf,
    catalog: PackageCatalog,
}

impl ConfigMerger {
    pub fn new(tests_dir: impl Into<PathBuf>, catalog: PackageCatalog) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            catalog,
        }
    }

    pub fn from_settings(settings: &ToolSettings) -> Self {
        Self::new(settings.tests_dir.clone(), PackageCatalog::from_settings(settings))
    }

    pub fn tests_dir(&self) -> &Path {
        &self.tests_dir
    }

    /// Path of a component's test document for a target
    pub fn test_document_path(&self, component: &str, target: &str) -> PathBuf {
        self.tests_dir.join(component).join(format!("test.{target}.yaml"))
    }

    /// Merge the components' documents for `target`, in the given order
    ///
    /// The first non-empty shared package set becomes the baseline. A later
    /// set conflicts when it declares a baseline package with a different
    /// value, or needs another variant of a resource kind the baseline
    /// already has (`uart_9600` vs `uart_19200`). Components without shared
    /// packages merge with any baseline.
    pub fn merge<S: AsRef<str>>(&self, components: &[S], target: &str) -> MergeResult<Value> {
        if components.is_empty() {
            return Err(MergeError::NoComponents);
        }

        let mut merged = Value::Mapping(Mapping::new());
        let mut baseline: Option<DeclaredPackages> = None;

        for component in components {
            let component = component.as_ref();
            let (declared, document) = self.prepare(component, target)?;
            check_packages(&mut baseline, component, &declared)?;
            merged = merge_config(merged, document);
        }

        if let (Some(packages), Value::Mapping(map)) = (&baseline, &mut merged) {
            let block = packages.to_mapping();
            if !block.is_empty() {
                map.insert(Value::from(PACKAGES_KEY), Value::Mapping(block));
            }
        }

        let mut merged = deduplicate_by_id(merged);
        if let Value::Mapping(map) = &mut merged {
            map.remove(DEVICE_SECTION_KEY);
        }

        info!("Merged {} components for {}", components.len(), target);
        Ok(merged)
    }

    /// Load one component's document and make it safe to merge
    fn prepare(&self, component: &str, target: &str) -> MergeResult<(DeclaredPackages, Value)> {
        let path = self.test_document_path(component, target);
        if !path.is_file() {
            return Err(MergeError::MissingTestDocument {
                component: component.to_string(),
                path,
            });
        }
        debug!("Preparing {} from {:?}", component, path);

        let mut document = load_yaml(&path)?;
        let declared = self.catalog.declared_in(&document);
        let uses_component_dir = references(&document, COMPONENT_DIR_SUBSTITUTION);

        let top_level_subs = document
            .get(SUBSTITUTIONS_KEY)
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default();

        document = expand_local_packages(document, &declared);

        if let Value::Mapping(map) = &mut document {
            self.rebind_substitutions(map, top_level_subs, component, uses_component_dir)?;
        }

        Ok((declared, prefix_references(document, component)))
    }

    /// Re-apply top-level substitutions over package-supplied ones and
    /// rename them all under the component's prefix
    fn rebind_substitutions(
        &self,
        map: &mut Mapping,
        top_level_subs: Mapping,
        component: &str,
        uses_component_dir: bool,
    ) -> MergeResult<()> {
        let mut subs = match map.remove(SUBSTITUTIONS_KEY) {
            Some(Value::Mapping(subs)) => subs,
            _ => Mapping::new(),
        };
        for (name, value) in top_level_subs {
            subs.insert(name, value);
        }

        let mut subs = prefix_names(subs, component);
        if uses_component_dir {
            let dir = absolute(&self.tests_dir.join(component))?;
            subs.insert(
                Value::String(format!("{component}_{COMPONENT_DIR_SUBSTITUTION}")),
                Value::String(dir.to_string_lossy().into_owned()),
            );
        }
        if !subs.is_empty() {
            map.insert(Value::from(SUBSTITUTIONS_KEY), Value::Mapping(subs));
        }
        Ok(())
    }
}

/// Deep-merge component-specific packages into the document and drop the
/// `packages` key
///
/// Shared packages are skipped; they are reinstated once after merging.
fn expand_local_packages(document: Value, shared: &DeclaredPackages) -> Value {
    let local: Vec<Value> = match document.get(PACKAGES_KEY) {
        Some(Value::Mapping(packages)) => packages
            .iter()
            .filter(|(key, value)| !shared.contains_key(key) && value.is_mapping())
            .map(|(_, value)| value.clone())
            .collect(),
        Some(Value::Sequence(packages)) => packages.iter().filter(|v| v.is_mapping()).cloned().collect(),
        _ => Vec::new(),
    };

    let mut document = local.into_iter().fold(document, merge_config);
    if let Value::Mapping(map) = &mut document {
        map.remove(PACKAGES_KEY);
    }
    document
}

fn check_packages(
    baseline: &mut Option<DeclaredPackages>,
    component: &str,
    declared: &DeclaredPackages,
) -> MergeResult<()> {
    if declared.is_empty() {
        return Ok(());
    }
    if baseline.is_none() {
        *baseline = Some(declared.clone());
        return Ok(());
    }
    let Some(base) = baseline.as_mut() else {
        return Ok(());
    };

    for name in declared.names() {
        if let (Some(expected), Some(found)) = (base.value_of(&name), declared.value_of(&name)) {
            if expected != found {
                return Err(MergeError::PackageConflict {
                    component: component.to_string(),
                    package: name,
                });
            }
        }
    }

    let base_signature = Signature::from_packages(base.names());
    let new_signature = Signature::from_packages(declared.names());
    if let (Some(base_signature), Some(new_signature)) = (base_signature, new_signature) {
        if !base_signature.is_compatible_with(&new_signature) {
            return Err(MergeError::IncompatibleResources {
                component: component.to_string(),
                baseline: base_signature,
                found: new_signature,
            });
        }
    }

    base.absorb(declared);
    Ok(())
}

fn absolute(path: &Path) -> MergeResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| MergeError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}
