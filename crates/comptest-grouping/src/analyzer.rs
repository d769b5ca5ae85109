//! Resource signature analysis of component test directories
//!
//! Each component's test directory holds `test.<target>.yaml` documents (and
//! shared fragments such as `common.yaml`). Every document is loaded once and
//! checked for:
//!
//! - shared resource packages it declares (per target, for test documents)
//! - `!extend` / `!remove` directives anywhere in the tree
//! - resource keys (`i2c`, `uart`, ...) defined inline at the top level
//! - `$component_dir` references

use crate::packages::PackageCatalog;
use comptest_config::{
    contains_structural_directive, load_yaml_string, subdirectory_names, yaml_files_in, ConfigResult,
    ToolSettings, Value,
};
use comptest_core::{Groupability, Signature};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Prefix and suffix of per-target test document names
const TEST_FILE_PREFIX: &str = "test.";
const YAML_SUFFIX: &str = ".yaml";

fn component_dir_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{?component_dir\}?").expect("valid component_dir pattern"))
}

/// Test target named by a `test.<target>.yaml` file, if it is one
pub fn test_target_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let target = name.strip_prefix(TEST_FILE_PREFIX)?.strip_suffix(YAML_SUFFIX)?;
    (!target.is_empty()).then(|| target.to_string())
}

/// Findings for a single document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileAnalysis {
    /// Shared packages declared, implied ones included, sorted
    pub packages: Vec<String>,
    pub uses_structural_directives: bool,
    pub defines_resource_directly: bool,
    pub uses_local_file_references: bool,
    /// Whether the document could be read and parsed
    pub loaded: bool,
}

/// Findings for a component's whole test directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentAnalysis {
    pub name: String,
    /// Test target -> sorted shared packages; every test document has an
    /// entry, empty when it declares no packages
    pub target_resources: BTreeMap<String, Vec<String>>,
    pub uses_structural_directives: bool,
    pub defines_resource_directly: bool,
    pub uses_local_file_references: bool,
}

impl ComponentAnalysis {
    /// Test targets this component has a document for
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.target_resources.keys().map(String::as_str)
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.target_resources.contains_key(target)
    }
}

/// Analysis of every component plus its classification
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub components: BTreeMap<String, ComponentAnalysis>,
    pub classifications: BTreeMap<String, Groupability>,
    /// Shared packages known when the report was made
    pub known_packages: BTreeSet<String>,
}

impl AnalysisReport {
    pub fn get(&self, name: &str) -> Option<&ComponentAnalysis> {
        self.components.get(name)
    }

    pub fn classification(&self, name: &str) -> Option<&Groupability> {
        self.classifications.get(name)
    }

    pub fn is_groupable(&self, name: &str) -> bool {
        self.classification(name).map_or(false, Groupability::is_groupable)
    }

    /// Names of components that may not be merged, with the reason
    pub fn non_groupable(&self) -> BTreeMap<&str, &Groupability> {
        self.classifications
            .iter()
            .filter(|(_, class)| !class.is_groupable())
            .map(|(name, class)| (name.as_str(), class))
            .collect()
    }

    /// Grouping signature of a component on a target (see
    /// [`create_grouping_signature`])
    pub fn signature(&self, name: &str, target: &str) -> Option<Signature> {
        let analysis = self.components.get(name)?;
        create_grouping_signature(&analysis.target_resources, target, &self.known_packages)
    }
}

/// Signature of a component's resources on one target
///
/// Only known shared packages count. Returns `None` when none remain, in which
/// case the component is not grouped by signature on that target.
pub fn create_grouping_signature(
    target_resources: &BTreeMap<String, Vec<String>>,
    target: &str,
    known_packages: &BTreeSet<String>,
) -> Option<Signature> {
    let resources = target_resources.get(target)?;
    Signature::from_packages(resources.iter().filter(|p| known_packages.contains(p.as_str())))
}

/// Reads component test directories and classifies components
#[derive(Debug, Clone)]
pub struct ResourceAnalyzer {
    catalog: PackageCatalog,
    direct_resource_keys: Vec<String>,
    isolated: BTreeMap<String, String>,
    base_resource_components: BTreeSet<String>,
}

impl ResourceAnalyzer {
    pub fn new(settings: &ToolSettings) -> Self {
        Self::with_catalog(settings, PackageCatalog::from_settings(settings))
    }

    pub fn with_catalog(settings: &ToolSettings, catalog: PackageCatalog) -> Self {
        Self {
            catalog,
            direct_resource_keys: settings.direct_resource_keys.clone(),
            isolated: settings.isolated_components.clone(),
            base_resource_components: settings.base_resource_components.clone(),
        }
    }

    /// Mark additional components as isolated
    pub fn isolate<I, S>(&mut self, names: I, reason: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.isolated.entry(name.into()).or_insert_with(|| reason.to_string());
        }
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// Inspect an already loaded document
    pub fn analyze_document(&self, document: &Value) -> FileAnalysis {
        let defines_resource_directly = document
            .as_mapping()
            .map_or(false, |map| self.direct_resource_keys.iter().any(|key| map.contains_key(key.as_str())));

        FileAnalysis {
            packages: self.catalog.declared_in(document).names().into_iter().collect(),
            uses_structural_directives: contains_structural_directive(document),
            defines_resource_directly,
            uses_local_file_references: false,
            loaded: true,
        }
    }

    /// Load and inspect one document
    ///
    /// A document that cannot be read or parsed contributes nothing.
    pub fn analyze_file(&self, path: &Path) -> FileAnalysis {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable test document {:?}: {}", path, e);
                return FileAnalysis::default();
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let source_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let document = match load_yaml_string(base_dir, &content, source_name) {
            Ok(document) => document,
            Err(e) => {
                warn!("Skipping unparsable test document {:?}: {}", path, e);
                return FileAnalysis::default();
            }
        };

        let mut analysis = self.analyze_document(&document);
        analysis.uses_local_file_references = component_dir_reference().is_match(&content);
        analysis
    }

    /// Analyze every document of one component test directory
    pub fn analyze_component(&self, component_dir: &Path) -> ConfigResult<ComponentAnalysis> {
        let name = component_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mut component = ComponentAnalysis {
            name,
            ..ComponentAnalysis::default()
        };

        for path in yaml_files_in(component_dir)? {
            let analysis = self.analyze_file(&path);
            component.uses_structural_directives |= analysis.uses_structural_directives;
            component.defines_resource_directly |= analysis.defines_resource_directly;
            component.uses_local_file_references |= analysis.uses_local_file_references;

            if let Some(target) = test_target_of(&path) {
                component.target_resources.insert(target, analysis.packages);
            }
        }

        debug!(
            "Analyzed {}: {} targets",
            component.name,
            component.target_resources.len()
        );
        Ok(component)
    }

    /// Classify a component; the first matching rule wins
    pub fn classify(&self, analysis: &ComponentAnalysis) -> Groupability {
        if let Some(reason) = self.isolated.get(&analysis.name) {
            return Groupability::Isolated {
                reason: reason.clone(),
            };
        }
        if self.base_resource_components.contains(&analysis.name) {
            return Groupability::BaseResourceProvider;
        }
        if analysis.uses_structural_directives {
            return Groupability::StructuralDirectiveUser;
        }
        if analysis.defines_resource_directly {
            return Groupability::DirectResourceDefiner;
        }
        Groupability::Groupable
    }

    /// Analyze and classify every component directory under `tests_dir`
    pub fn analyze_all(&self, tests_dir: &Path) -> ConfigResult<AnalysisReport> {
        let mut report = AnalysisReport {
            known_packages: self.catalog.known().clone(),
            ..AnalysisReport::default()
        };

        for name in subdirectory_names(tests_dir)? {
            let analysis = self.analyze_component(&tests_dir.join(&name))?;
            report.classifications.insert(name.clone(), self.classify(&analysis));
            report.components.insert(name, analysis);
        }

        info!(
            "Analyzed {} components ({} not groupable)",
            report.components.len(),
            report.non_groupable().len()
        );
        Ok(report)
    }
}
