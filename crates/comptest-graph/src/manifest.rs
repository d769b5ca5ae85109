//! Component manifest index
//!
//! Every subdirectory of the components directory that holds a
//! `manifest.yaml` is a component. A `<platform>.yaml` file beside it, where
//! `<platform>` names a registered platform component, is the manifest of
//! that component's implementation of the platform (e.g.
//! `components/bme280/sensor.yaml`).

use crate::error::{GraphError, GraphResult};
use comptest_config::{subdirectory_names, yaml_files_in, Value};
use comptest_core::{Framework, Platform, TargetEnvironment};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Manifest file name inside a component directory
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Resolver behind [`AutoLoad::Computed`]
pub type AutoLoadFn = dyn Fn(&TargetEnvironment, Option<&Value>) -> Vec<String> + Send + Sync;

/// Components a component implicitly pulls in
///
/// The shape is decided once at registration time. `Computed` receives the
/// target environment explicitly, plus the component's configuration when
/// one is known.
#[derive(Clone)]
pub enum AutoLoad {
    Fixed(Vec<String>),
    Computed(Arc<AutoLoadFn>),
}

impl AutoLoad {
    pub fn computed<F>(resolver: F) -> Self
    where
        F: Fn(&TargetEnvironment, Option<&Value>) -> Vec<String> + Send + Sync + 'static,
    {
        AutoLoad::Computed(Arc::new(resolver))
    }

    /// Evaluate under an environment
    pub fn resolve(&self, env: &TargetEnvironment, config: Option<&Value>) -> Vec<String> {
        match self {
            AutoLoad::Fixed(names) => names.clone(),
            AutoLoad::Computed(resolver) => resolver(env, config),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AutoLoad::Fixed(names) if names.is_empty())
    }
}

impl Default for AutoLoad {
    fn default() -> Self {
        AutoLoad::Fixed(Vec::new())
    }
}

impl fmt::Debug for AutoLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoLoad::Fixed(names) => f.debug_tuple("Fixed").field(names).finish(),
            AutoLoad::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// `auto_load` as written in a manifest file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AutoLoadSpec {
    List(Vec<String>),
    Conditional {
        #[serde(default)]
        always: Vec<String>,
        #[serde(default)]
        when: Vec<AutoLoadRule>,
    },
}

/// One conditional entry: loads its names when every set condition matches
#[derive(Debug, Clone, Deserialize)]
struct AutoLoadRule {
    #[serde(default)]
    framework: Option<Framework>,
    #[serde(default)]
    platform: Option<Platform>,
    load: Vec<String>,
}

impl AutoLoadRule {
    fn matches(&self, env: &TargetEnvironment) -> bool {
        self.framework.map_or(true, |f| env.framework == Some(f))
            && self.platform.map_or(true, |p| env.platform == Some(p))
    }
}

impl From<AutoLoadSpec> for AutoLoad {
    fn from(spec: AutoLoadSpec) -> Self {
        match spec {
            AutoLoadSpec::List(names) => AutoLoad::Fixed(names),
            AutoLoadSpec::Conditional { always, when } if when.is_empty() => AutoLoad::Fixed(always),
            AutoLoadSpec::Conditional { always, when } => AutoLoad::computed(move |env, _config| {
                let mut names = always.clone();
                for rule in when.iter().filter(|rule| rule.matches(env)) {
                    names.extend(rule.load.iter().cloned());
                }
                names
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestFile {
    dependencies: Vec<String>,
    auto_load: Option<AutoLoadSpec>,
    is_platform_component: bool,
}

impl ManifestFile {
    fn read(path: &Path) -> GraphResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| GraphError::ReadManifest {
            path: path.to_path_buf(),
            source: e,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| GraphError::ParseManifest {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// A component's implementation of a platform component
#[derive(Debug, Clone)]
pub struct PlatformManifest {
    pub platform: String,
    pub dependencies: Vec<String>,
    pub auto_load: AutoLoad,
}

impl PlatformManifest {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            dependencies: Vec::new(),
            auto_load: AutoLoad::default(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_load(mut self, auto_load: AutoLoad) -> Self {
        self.auto_load = auto_load;
        self
    }
}

/// Static metadata of one component
#[derive(Debug, Clone)]
pub struct ComponentManifest {
    pub name: String,
    /// Provider names; only the first dotted segment is significant
    pub dependencies: Vec<String>,
    pub auto_load: AutoLoad,
    /// Abstract base (e.g. `sensor`) that is not buildable on its own
    pub is_platform_component: bool,
    /// Platform manifests found beside this component, keyed by platform
    pub platforms: BTreeMap<String, PlatformManifest>,
}

impl ComponentManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            auto_load: AutoLoad::default(),
            is_platform_component: false,
            platforms: BTreeMap::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_load(mut self, auto_load: AutoLoad) -> Self {
        self.auto_load = auto_load;
        self
    }

    pub fn platform_component(mut self) -> Self {
        self.is_platform_component = true;
        self
    }

    pub fn with_platform(mut self, platform: PlatformManifest) -> Self {
        self.platforms.insert(platform.platform.clone(), platform);
        self
    }

    fn from_file(name: String, file: ManifestFile) -> Self {
        Self {
            name,
            dependencies: file.dependencies,
            auto_load: file.auto_load.map(AutoLoad::from).unwrap_or_default(),
            is_platform_component: file.is_platform_component,
            platforms: BTreeMap::new(),
        }
    }
}

/// All registered components, by name
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    components: BTreeMap<String, ComponentManifest>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a components directory
    ///
    /// A manifest that cannot be read or parsed aborts the whole scan.
    pub fn load(components_dir: &Path) -> GraphResult<Self> {
        info!("Loading component manifests from {:?}", components_dir);
        let mut index = Self::new();

        for name in subdirectory_names(components_dir)? {
            let manifest_path = components_dir.join(&name).join(MANIFEST_FILE);
            if !manifest_path.exists() {
                debug!("Skipping {} (no {})", name, MANIFEST_FILE);
                continue;
            }
            let file = ManifestFile::read(&manifest_path)?;
            index.register(ComponentManifest::from_file(name, file))?;
        }

        // Platform files can only be recognized once every platform
        // component is known.
        let mut found = Vec::new();
        for name in index.components.keys() {
            for path in yaml_files_in(&components_dir.join(name))? {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if stem == name || !index.is_platform_component(stem) {
                    continue;
                }
                let file = ManifestFile::read(&path)?;
                debug!("Loaded platform manifest {}.{}", stem, name);
                found.push((
                    name.clone(),
                    PlatformManifest {
                        platform: stem.to_string(),
                        dependencies: file.dependencies,
                        auto_load: file.auto_load.map(AutoLoad::from).unwrap_or_default(),
                    },
                ));
            }
        }
        for (name, platform) in found {
            index.add_platform(&name, platform)?;
        }

        info!("Loaded {} component manifests", index.len());
        Ok(index)
    }

    /// Register a component
    pub fn register(&mut self, manifest: ComponentManifest) -> GraphResult<()> {
        if self.components.contains_key(&manifest.name) {
            return Err(GraphError::DuplicateComponent(manifest.name));
        }
        self.components.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    /// Attach a platform manifest to a registered component
    pub fn add_platform(&mut self, component: &str, platform: PlatformManifest) -> GraphResult<()> {
        let manifest = self
            .components
            .get_mut(component)
            .ok_or_else(|| GraphError::UnknownComponent(component.to_string()))?;
        manifest.platforms.insert(platform.platform.clone(), platform);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ComponentManifest> {
        self.components.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn is_platform_component(&self, name: &str) -> bool {
        self.get(name).map_or(false, |m| m.is_platform_component)
    }

    /// Component names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentManifest> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_conditional_auto_load() {
        let spec: AutoLoadSpec = serde_yaml::from_str(
            "always: [socket]\nwhen:\n  - framework: arduino\n    load: [async_tcp]\n  - platform: esp32\n    load: [esp32_ble]\n",
        )
        .unwrap();
        let auto_load = AutoLoad::from(spec);

        assert_eq!(auto_load.resolve(&TargetEnvironment::NO_TARGET, None), vec!["socket"]);
        assert_eq!(
            auto_load.resolve(&TargetEnvironment::with_framework(Framework::Arduino), None),
            vec!["socket", "async_tcp"]
        );
        assert_eq!(
            auto_load.resolve(&TargetEnvironment::with_platform(Platform::Esp32), None),
            vec!["socket", "esp32_ble"]
        );
    }

    #[test]
    fn test_list_auto_load_is_fixed() {
        let spec: AutoLoadSpec = serde_yaml::from_str("[mdns, network]").unwrap();
        assert!(matches!(AutoLoad::from(spec), AutoLoad::Fixed(names) if names == ["mdns", "network"]));
    }

    #[test]
    fn test_load_index_with_platform_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "sensor/manifest.yaml", "is_platform_component: true\n");
        write_file(dir.path(), "i2c/manifest.yaml", "");
        write_file(dir.path(), "bme280/manifest.yaml", "dependencies: [i2c]\n");
        write_file(dir.path(), "bme280/sensor.yaml", "dependencies: [i2c]\nauto_load: [sensirion_common]\n");
        write_file(dir.path(), "bme280/notes.yaml", "unrelated: true\n");
        fs::create_dir_all(dir.path().join("__pycache__")).unwrap();

        let index = ManifestIndex::load(dir.path()).unwrap();
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["bme280", "i2c", "sensor"]);

        let bme280 = index.get("bme280").unwrap();
        assert_eq!(bme280.platforms.len(), 1);
        assert_eq!(bme280.platforms["sensor"].dependencies, vec!["i2c"]);
        assert!(index.is_platform_component("sensor"));
    }

    #[test]
    fn test_invalid_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "broken/manifest.yaml", "dependencies: {not: [a list\n");

        let result = ManifestIndex::load(dir.path());
        assert!(matches!(result, Err(GraphError::ParseManifest { .. })));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut index = ManifestIndex::new();
        index.register(ComponentManifest::new("wifi")).unwrap();
        let result = index.register(ComponentManifest::new("wifi"));
        assert!(matches!(result, Err(GraphError::DuplicateComponent(name)) if name == "wifi"));
    }

    #[test]
    fn test_missing_components_dir() {
        let dir = TempDir::new().unwrap();
        let result = ManifestIndex::load(&dir.path().join("missing"));
        assert!(matches!(result, Err(GraphError::Config(_))));
    }
}
