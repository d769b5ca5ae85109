//! YAML test document loader
//!
//! Resolves `!include path` (also the `!include {file: path}` form) relative
//! to the including file. Structural directives (`!extend`, `!remove`) and
//! any other tag (`!lambda`, `!secret`, ...) are kept as tagged values so
//! later stages can inspect or re-emit them.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const INCLUDE_TAG: &str = "!include";

/// YAML loader for component test documents
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    base_dir: PathBuf,
    /// Track included files to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new loader resolving relative paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(k, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        if tag == INCLUDE_TAG {
            return self.process_include(tagged.value, source_path);
        }

        let processed = self.process_value(tagged.value, source_path)?;
        Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
            tag: tagged.tag,
            value: processed,
        })))
    }

    fn process_include(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        let target = match &value {
            Value::Mapping(map) => {
                if map.get("vars").is_some() {
                    debug!("Include vars are not expanded: {:?}", source_path);
                }
                map.get("file").cloned().unwrap_or(Value::Null)
            }
            _ => value,
        };

        let include_path = self.value_to_path(&target, source_path)?;
        if !include_path.exists() {
            return Err(ConfigError::IncludeNotFound { path: include_path });
        }
        debug!("Including file: {:?}", include_path);
        self.load_file(&include_path)
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = match value {
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidIncludePath {
                    path: format!("{:?}", value),
                    reason: "path must be a string".to_string(),
                })
            }
        };

        let base_dir = source_path.parent().unwrap_or(&self.base_dir);
        let resolved = if Path::new(&path_str).is_absolute() {
            PathBuf::from(&path_str)
        } else {
            base_dir.join(&path_str)
        };

        Ok(resolved)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Load a YAML file with include processing
pub fn load_yaml(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(PathBuf::new());
    loader.load_file(path)
}

/// Load a YAML string with include processing relative to `base_dir`
pub fn load_yaml_string(
    base_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(base_dir);
    let source = loader.base_dir().join(source_name);
    loader.load_string(content, &source)
}

/// All `*.yaml` files directly inside a directory, sorted by name
pub fn yaml_files_in(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ConfigError::ReadFile {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().map(|ext| ext == "yaml").unwrap_or(false))
        .collect();

    files.sort();
    Ok(files)
}

/// Sorted names of the subdirectories of `dir`
pub fn subdirectory_names(dir: &Path) -> ConfigResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| ConfigError::ReadFile {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();

    names.sort();
    Ok(names)
}
