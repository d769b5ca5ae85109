//! Tool settings
//!
//! Read from `comptest.yaml` at the repository root when present. Every field
//! has a default, so an empty or missing file yields the stock layout and
//! policy tables. Environment variables override the file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding [`ToolSettings::batch_size`]
pub const BATCH_SIZE_ENV: &str = "COMPTEST_BATCH_SIZE";

/// Environment variable overriding [`ToolSettings::build_dir`]
pub const BUILD_DIR_ENV: &str = "COMPTEST_BUILD_DIR";

/// Components that must be built on their own, with the reason
const ISOLATED_COMPONENTS: &[(&str, &str)] = &[
    ("animation", "Has display lambda in common.yaml that requires existing display platform - breaks when merged without display"),
    ("esphome", "Defines devices/areas in esphome: section that are referenced in other sections - breaks when merged"),
    ("ethernet", "Defines ethernet: which conflicts with wifi: used by most components"),
    ("ethernet_info", "Related to ethernet component which conflicts with wifi"),
    ("lvgl", "Defines multiple SDL displays on host platform that conflict when merged with other display configs"),
    ("openthread", "Conflicts with wifi: used by most components"),
    ("openthread_info", "Conflicts with wifi: used by most components"),
    ("matrix_keypad", "Needs isolation due to keypad"),
    ("mcp4725", "no YAML config to specify i2c bus id"),
    ("mcp47a1", "no YAML config to specify i2c bus id"),
    ("modbus_controller", "Defines multiple modbus buses for testing client/server functionality - conflicts with package modbus bus"),
    ("neopixelbus", "RMT type conflict with ESP32 Arduino/ESP-IDF headers (enum vs struct rmt_channel_t)"),
    ("packages", "cannot merge packages"),
];

/// Components implementing a shared resource themselves
const BASE_RESOURCE_COMPONENTS: &[&str] = &["canbus", "i2c", "modbus", "spi", "uart"];

/// Top-level keys that declare a resource inline
const DIRECT_RESOURCE_KEYS: &[&str] = &["i2c", "spi", "uart", "modbus", "canbus"];

/// Largest merged group per test target
const GROUP_SIZE_LIMITS: &[(&str, usize)] = &[("bk72xx-ard", 10), ("esp8266-ard", 10), ("rp2040-ard", 20)];

/// Settings for analysis, grouping, merging and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Directory holding one subdirectory (with `manifest.yaml`) per component
    pub components_dir: PathBuf,

    /// Directory holding the per-component test documents
    pub tests_dir: PathBuf,

    /// Directory holding the wrapper base files
    pub build_components_dir: PathBuf,

    /// Directory whose subdirectories are the shared resource packages
    pub common_dir: PathBuf,

    /// Scratch directory for merged artifacts
    pub build_dir: PathBuf,

    /// Weighted batch size target
    pub batch_size: usize,

    /// Components that are never grouped, with the reason
    pub isolated_components: BTreeMap<String, String>,

    /// Components that implement a shared resource themselves
    pub base_resource_components: BTreeSet<String>,

    /// Top-level keys that define a resource directly
    pub direct_resource_keys: Vec<String>,

    /// Packages that always bring other packages along (e.g. modbus -> uart)
    pub package_dependencies: BTreeMap<String, Vec<String>>,

    /// Maximum group size per test target
    pub group_size_limits: BTreeMap<String, usize>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            components_dir: PathBuf::from("components"),
            tests_dir: PathBuf::from("tests/components"),
            build_components_dir: PathBuf::from("tests/test_build_components"),
            common_dir: PathBuf::from("tests/test_build_components/common"),
            build_dir: PathBuf::from("tests/test_build_components/build"),
            batch_size: 40,
            isolated_components: ISOLATED_COMPONENTS
                .iter()
                .map(|(name, reason)| (name.to_string(), reason.to_string()))
                .collect(),
            base_resource_components: BASE_RESOURCE_COMPONENTS.iter().map(|s| s.to_string()).collect(),
            direct_resource_keys: DIRECT_RESOURCE_KEYS.iter().map(|s| s.to_string()).collect(),
            package_dependencies: BTreeMap::from([("modbus".to_string(), vec!["uart".to_string()])]),
            group_size_limits: GROUP_SIZE_LIMITS
                .iter()
                .map(|(target, limit)| (target.to_string(), *limit))
                .collect(),
        }
    }
}

impl ToolSettings {
    /// Settings file looked up at the repository root
    pub const FILE_NAME: &'static str = "comptest.yaml";

    /// Load settings for a repository root
    ///
    /// Reads `comptest.yaml` when it exists, rebases relative directories on
    /// `root` and applies environment overrides.
    pub fn load(root: &Path) -> ConfigResult<Self> {
        let path = root.join(Self::FILE_NAME);
        let settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!("No {} at {:?}, using defaults", Self::FILE_NAME, root);
            Self::default()
        };

        let mut settings = settings.with_root(root);
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a settings file without rebasing or overrides
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolve every relative directory against `root`
    pub fn with_root(mut self, root: &Path) -> Self {
        for dir in [
            &mut self.components_dir,
            &mut self.tests_dir,
            &mut self.build_components_dir,
            &mut self.common_dir,
            &mut self.build_dir,
        ] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`ToolSettings::load`])
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(BATCH_SIZE_ENV) {
            self.batch_size = raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: BATCH_SIZE_ENV.to_string(),
                reason: format!("'{raw}' is not a positive integer"),
            })?;
        }
        if let Some(raw) = lookup(BUILD_DIR_ENV) {
            self.build_dir = PathBuf::from(raw);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "batch_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some((target, _)) = self.group_size_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(ConfigError::InvalidSetting {
                key: format!("group_size_limits.{target}"),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Reason a component is isolated, if it is
    pub fn isolation_reason(&self, component: &str) -> Option<&str> {
        self.isolated_components.get(component).map(String::as_str)
    }

    pub fn is_base_resource_component(&self, component: &str) -> bool {
        self.base_resource_components.contains(component)
    }

    pub fn group_size_limit(&self, target: &str) -> Option<usize> {
        self.group_size_limits.get(target).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = ToolSettings::default();
        assert_eq!(settings.batch_size, 40);
        assert!(settings.isolation_reason("lvgl").is_some());
        assert!(settings.is_base_resource_component("uart"));
        assert_eq!(settings.package_dependencies["modbus"], vec!["uart".to_string()]);
        assert!(settings.direct_resource_keys.iter().any(|k| k == "canbus"));
        assert_eq!(settings.group_size_limit("esp8266-ard"), Some(10));
        assert_eq!(settings.group_size_limit("esp32-idf"), None);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ToolSettings::FILE_NAME),
            "batch_size: 25\ngroup_size_limits:\n  esp32-idf: 5\n",
        )
        .unwrap();

        let settings = ToolSettings::from_file(&dir.path().join(ToolSettings::FILE_NAME)).unwrap();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.group_size_limit("esp32-idf"), Some(5));
        assert_eq!(settings.group_size_limit("esp8266-ard"), None);
        assert!(settings.isolation_reason("lvgl").is_some());
    }

    #[test]
    fn test_with_root_rebases_relative_dirs() {
        let settings = ToolSettings::default().with_root(Path::new("/repo"));
        assert_eq!(settings.tests_dir, PathBuf::from("/repo/tests/components"));
        assert_eq!(
            settings.common_dir,
            PathBuf::from("/repo/tests/test_build_components/common")
        );
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            (BATCH_SIZE_ENV.to_string(), "12".to_string()),
            (BUILD_DIR_ENV.to_string(), "/tmp/build".to_string()),
        ]);
        let mut settings = ToolSettings::default();
        settings.apply_overrides(|key| env.get(key).cloned()).unwrap();
        assert_eq!(settings.batch_size, 12);
        assert_eq!(settings.build_dir, PathBuf::from("/tmp/build"));
    }

    #[test]
    fn test_invalid_override() {
        let mut settings = ToolSettings::default();
        let result = settings.apply_overrides(|key| (key == BATCH_SIZE_ENV).then(|| "many".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let settings = ToolSettings {
            batch_size: 0,
            ..ToolSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
