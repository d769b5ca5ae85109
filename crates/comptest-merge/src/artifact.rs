//! Build artifacts for merged and individual component tests
//!
//! Each target has one or more wrapper base files in the build components
//! directory, `build_components_base.<target>[-<version>].yaml`. A wrapper
//! provides the device identity section and includes the test document in
//! place of the `$component_test_file` placeholder.

use crate::error::{MergeError, MergeResult};
use crate::merger::ConfigMerger;
use comptest_config::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Placeholder in wrapper base files replaced by the included test document
pub const COMPONENT_TEST_FILE_PLACEHOLDER: &str = "$component_test_file";

const BASE_FILE_PREFIX: &str = "build_components_base.";
const DEVICE_NAME_PREFIX: &str = "comptest";
const GROUP_NAME_COMPONENTS: usize = 3;
const GROUP_HASH_LEN: usize = 8;

/// A wrapper base file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseFile {
    /// Test target, e.g. `esp32-idf`
    pub target: String,
    /// Target plus optional version suffix, e.g. `esp32-idf-51`
    pub target_with_version: String,
    pub path: PathBuf,
}

/// Split a trailing numeric version from a target name
///
/// `esp32-idf-51` -> (`esp32-idf`, `Some("51")`); `esp32-idf` -> (`esp32-idf`, `None`)
pub fn split_target_version(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('-') {
        Some((target, version)) if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) => {
            (target, Some(version))
        }
        _ => (name, None),
    }
}

/// Wrapper base files by target, each list sorted by file name
pub fn discover_base_files(dir: &Path) -> MergeResult<BTreeMap<String, Vec<BaseFile>>> {
    let mut result: BTreeMap<String, Vec<BaseFile>> = BTreeMap::new();

    for path in comptest_config::yaml_files_in(dir)? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(target_with_version) = stem.strip_prefix(BASE_FILE_PREFIX) else {
            continue;
        };
        let (target, _) = split_target_version(target_with_version);
        result.entry(target.to_string()).or_default().push(BaseFile {
            target: target.to_string(),
            target_with_version: target_with_version.to_string(),
            path: path.clone(),
        });
    }

    debug!("Found base files for {} targets", result.len());
    Ok(result)
}

/// Readable group name: the first three components, then `_plus_<n>`
pub fn group_name<S: AsRef<str>>(components: &[S]) -> String {
    let shown: Vec<&str> = components
        .iter()
        .take(GROUP_NAME_COMPONENTS)
        .map(AsRef::as_ref)
        .collect();
    let mut name = shown.join("_");
    if components.len() > GROUP_NAME_COMPONENTS {
        name.push_str(&format!("_plus_{}", components.len() - GROUP_NAME_COMPONENTS));
    }
    name
}

/// Short hash identifying a group on a target, independent of member order
pub fn group_hash<S: AsRef<str>>(components: &[S], target: &str) -> String {
    let mut sorted: Vec<&str> = components.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    let input = format!("{}_{}", sorted.join("_"), target);
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..GROUP_HASH_LEN].to_string()
}

/// Device name used when building a group
pub fn device_name(target: &str, hash: &str) -> String {
    format!("{DEVICE_NAME_PREFIX}{}{hash}", target.replace('-', ""))
}

/// Files written for one merged group build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupArtifact {
    pub components: Vec<String>,
    pub target: String,
    pub target_with_version: String,
    pub group_name: String,
    pub hash: String,
    pub device_name: String,
    pub merged_path: PathBuf,
    pub wrapper_path: PathBuf,
}

impl GroupArtifact {
    /// Paths and names for a group; nothing is written
    pub fn describe(components: &[String], base: &BaseFile, build_dir: &Path) -> Self {
        let group_name = group_name(components);
        let hash = group_hash(components, &base.target);
        let stem = format!("{group_name}_{hash}.{}", base.target_with_version);
        Self {
            components: components.to_vec(),
            target: base.target.clone(),
            target_with_version: base.target_with_version.clone(),
            device_name: device_name(&base.target, &hash),
            merged_path: build_dir.join(format!("merged_{stem}.yaml")),
            wrapper_path: build_dir.join(format!("test_{stem}.yaml")),
            group_name,
            hash,
        }
    }
}

/// Writes merged documents and wrapper files into the build directory
///
/// Paths are deterministic, so re-running overwrites earlier output.
pub struct ArtifactWriter<'a> {
    merger: &'a ConfigMerger,
    build_dir: PathBuf,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(merger: &'a ConfigMerger, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            merger,
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Merge `components` for `target` and write the result to `output`
    pub fn write_merged(&self, components: &[String], target: &str, output: &Path) -> MergeResult<()> {
        let merged = self.merger.merge(components, target)?;
        write_yaml(output, &merged)?;
        info!("Merged {} components into {:?}", components.len(), output);
        Ok(())
    }

    /// Merge a group and write its merged document and wrapper
    pub fn write_group(&self, components: &[String], base: &BaseFile) -> MergeResult<GroupArtifact> {
        let artifact = GroupArtifact::describe(components, base, &self.build_dir);
        self.write_merged(components, &base.target, &artifact.merged_path)?;

        let merged_ref = file_name(&artifact.merged_path);
        write_wrapper(&base.path, &artifact.wrapper_path, &merged_ref)?;
        Ok(artifact)
    }

    /// Write the wrapper for a component built on its own
    pub fn write_individual(&self, component: &str, base: &BaseFile) -> MergeResult<PathBuf> {
        let test_file = self.merger.test_document_path(component, &base.target);
        if !test_file.is_file() {
            return Err(MergeError::MissingTestDocument {
                component: component.to_string(),
                path: test_file,
            });
        }

        let output = self
            .build_dir
            .join(format!("{component}.test.{}.yaml", base.target_with_version));
        let test_ref = relative_path(&self.build_dir, &test_file);
        write_wrapper(&base.path, &output, &test_ref.to_string_lossy())?;
        Ok(output)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn ensure_parent(path: &Path) -> MergeResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MergeError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn write_yaml(path: &Path, value: &Value) -> MergeResult<()> {
    let content = serde_yaml::to_string(value)?;
    ensure_parent(path)?;
    fs::write(path, content).map_err(|e| MergeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_wrapper(base: &Path, output: &Path, included: &str) -> MergeResult<()> {
    let content = fs::read_to_string(base).map_err(|e| MergeError::Io {
        path: base.to_path_buf(),
        source: e,
    })?;
    ensure_parent(output)?;
    fs::write(output, content.replace(COMPONENT_TEST_FILE_PLACEHOLDER, included)).map_err(|e| MergeError::Io {
        path: output.to_path_buf(),
        source: e,
    })
}

/// Path of `target` relative to directory `from`, lexically
fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = target.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for component in &to[common..] {
        result.push(component.as_os_str());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target_version() {
        assert_eq!(split_target_version("esp32-idf-51"), ("esp32-idf", Some("51")));
        assert_eq!(split_target_version("esp32-idf"), ("esp32-idf", None));
        assert_eq!(split_target_version("host"), ("host", None));
    }

    #[test]
    fn test_group_name() {
        let few = ["a", "b"];
        assert_eq!(group_name(&few), "a_b");
        let many = ["a", "b", "c", "d", "e"];
        assert_eq!(group_name(&many), "a_b_c_plus_2");
    }

    #[test]
    fn test_group_hash_ignores_order() {
        let hash = group_hash(&["bme280", "bh1750"], "esp32-idf");
        assert_eq!(hash.len(), GROUP_HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, group_hash(&["bh1750", "bme280"], "esp32-idf"));
        assert_ne!(hash, group_hash(&["bh1750", "bme280"], "esp32-ard"));
    }

    #[test]
    fn test_device_name() {
        assert_eq!(device_name("esp32-idf", "0123abcd"), "comptestesp32idf0123abcd");
    }

    #[test]
    fn test_relative_path() {
        let rel = relative_path(
            Path::new("/repo/tests/test_build_components/build"),
            Path::new("/repo/tests/components/bme280/test.esp32-idf.yaml"),
        );
        assert_eq!(rel, PathBuf::from("../../components/bme280/test.esp32-idf.yaml"));
    }
}
