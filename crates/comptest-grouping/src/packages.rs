//! Shared resource packages
//!
//! The shared packages are the subdirectories of the common test directory
//! (`i2c`, `spi`, `uart_9600`, ...). A test document refers to one under its
//! `packages` key, either by key (`uart_9600: !include ...`) or by naming
//! it as the value (`uart: uart_9600`).

use comptest_config::{subdirectory_names, Mapping, ToolSettings, Value};
use comptest_core::PACKAGES_KEY;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Shared packages known to this repository, with their implied packages
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    known: BTreeSet<String>,
    dependencies: BTreeMap<String, Vec<String>>,
}

impl PackageCatalog {
    pub fn new<I, S>(known: I, dependencies: BTreeMap<String, Vec<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
            dependencies,
        }
    }

    /// Discover packages under the configured common directory
    pub fn from_settings(settings: &ToolSettings) -> Self {
        Self::new(
            discover_packages(&settings.common_dir),
            settings.package_dependencies.clone(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    /// Known packages implied by `name` (e.g. `modbus` brings `uart`)
    pub fn implied_by(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|dep| self.known.contains(*dep))
    }

    /// Shared packages a document declares
    pub fn declared_in(&self, document: &Value) -> DeclaredPackages {
        let mut declared = DeclaredPackages::default();
        let Some(packages) = document.get(PACKAGES_KEY).and_then(Value::as_mapping) else {
            return declared;
        };

        for (key, value) in packages {
            let Some(name) = self.package_name(key, value) else {
                continue;
            };
            for dep in self.implied_by(&name) {
                declared.implied.insert(dep.to_string());
            }
            declared.entries.insert(name, (key.clone(), value.clone()));
        }
        declared
    }

    /// A value naming a known package wins over the key, so
    /// `uart: uart_9600` is `uart_9600` even though `uart` is known too.
    fn package_name(&self, key: &Value, value: &Value) -> Option<String> {
        if let Some(value) = value.as_str().filter(|v| self.contains(v)) {
            return Some(value.to_string());
        }
        key.as_str()
            .filter(|k| self.contains(k))
            .map(str::to_string)
    }
}

/// Shared packages declared by one test document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredPackages {
    /// Package name -> (key, value) as written under `packages`
    entries: BTreeMap<String, (Value, Value)>,
    /// Packages pulled in through another declared package
    implied: BTreeSet<String>,
}

impl DeclaredPackages {
    /// Every package the document needs, implied ones included, sorted
    pub fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().chain(self.implied.iter().cloned()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value declared for a package, if declared explicitly
    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|(_, value)| value)
    }

    /// Whether a `packages` key refers to one of these shared packages
    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.values().any(|(k, _)| k == key)
    }

    /// Add packages not declared yet
    pub fn absorb(&mut self, other: &DeclaredPackages) {
        for (name, entry) in &other.entries {
            self.entries.entry(name.clone()).or_insert_with(|| entry.clone());
        }
        self.implied.extend(other.implied.iter().cloned());
    }

    /// `packages` block holding each declared package once
    ///
    /// Packages implied through another declared package are left out; the
    /// implying package already brings them.
    pub fn to_mapping(&self) -> Mapping {
        let mut mapping = Mapping::new();
        for (name, (key, value)) in &self.entries {
            if self.implied.contains(name) {
                debug!("Skipping {} (implied by another package)", name);
                continue;
            }
            mapping.insert(key.clone(), value.clone());
        }
        mapping
    }
}

/// Names of the shared packages under `common_dir`
///
/// A missing directory yields no packages.
pub fn discover_packages(common_dir: &Path) -> BTreeSet<String> {
    if !common_dir.is_dir() {
        warn!("Common package directory {:?} not found, no shared packages", common_dir);
        return BTreeSet::new();
    }
    match subdirectory_names(common_dir) {
        Ok(names) => names.into_iter().collect(),
        Err(e) => {
            warn!("Failed to list {:?}: {}", common_dir, e);
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> PackageCatalog {
        PackageCatalog::new(
            ["i2c", "modbus", "spi", "uart", "uart_9600", "uart_19200"],
            BTreeMap::from([("modbus".to_string(), vec!["uart".to_string()])]),
        )
    }

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_declared_by_key_and_value() {
        let doc = parse("packages:\n  i2c: {i2c: []}\n  uart_bus: uart_9600\n  local: !include local.yaml\n");
        let declared = catalog().declared_in(&doc);
        let names: Vec<_> = declared.names().into_iter().collect();
        assert_eq!(names, vec!["i2c", "uart_9600"]);
        assert_eq!(declared.value_of("uart_9600"), Some(&Value::String("uart_9600".to_string())));
        assert!(declared.contains_key(&Value::String("uart_bus".to_string())));
        assert!(!declared.contains_key(&Value::String("local".to_string())));
    }

    #[test]
    fn test_value_wins_over_known_key() {
        let catalog = catalog();
        let slow = catalog.declared_in(&parse("packages:\n  uart: uart_9600\n"));
        let fast = catalog.declared_in(&parse("packages:\n  uart: uart_19200\n"));

        assert_eq!(slow.names().into_iter().collect::<Vec<_>>(), vec!["uart_9600"]);
        assert_eq!(fast.names().into_iter().collect::<Vec<_>>(), vec!["uart_19200"]);
        assert!(slow.contains_key(&Value::String("uart".to_string())));

        let included = catalog.declared_in(&parse("packages:\n  uart: !include common/uart/esp32-idf.yaml\n"));
        assert_eq!(included.names().into_iter().collect::<Vec<_>>(), vec!["uart"]);
    }

    #[test]
    fn test_implied_packages() {
        let doc = parse("packages:\n  modbus: {}\n  uart: {}\n");
        let declared = catalog().declared_in(&doc);
        let names: Vec<_> = declared.names().into_iter().collect();
        assert_eq!(names, vec!["modbus", "uart"]);

        let block = declared.to_mapping();
        assert_eq!(block.len(), 1);
        assert!(block.contains_key("modbus"));
    }

    #[test]
    fn test_list_form_declares_nothing() {
        let doc = parse("packages:\n  - !include a.yaml\n");
        assert!(catalog().declared_in(&doc).is_empty());
    }

    #[test]
    fn test_discover_packages() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("i2c")).unwrap();
        std::fs::create_dir_all(dir.path().join("uart_9600")).unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let found: Vec<_> = discover_packages(dir.path()).into_iter().collect();
        assert_eq!(found, vec!["i2c", "uart_9600"]);
        assert!(discover_packages(&dir.path().join("missing")).is_empty());
    }
}
