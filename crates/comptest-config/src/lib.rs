//! Test document loading and tool settings
//!
//! This crate reads the YAML test documents that components ship and the
//! tool's own `comptest.yaml`:
//!
//! - `!include path` - Include another YAML file, relative to the includer
//! - `!extend id` / `!remove` - Structural directives, kept as tagged values
//! - Any other tag (`!lambda`, `!secret`, ...) is preserved untouched
//!
//! It also implements the deep merge used when several test documents are
//! combined into one build.
//!
//! # Example
//!
//! ```ignore
//! use comptest_config::{load_yaml, merge_config, ToolSettings};
//!
//! let settings = ToolSettings::load(Path::new("."))?;
//! let doc = load_yaml(settings.tests_dir.join("bme280/test.esp32-idf.yaml"))?;
//! let merged = merge_config(Value::Mapping(Default::default()), doc);
//! ```

mod directive;
mod error;
mod loader;
mod merge;
mod settings;

pub use directive::{contains_structural_directive, directive_of, Directive, EXTEND_TAG, REMOVE_TAG};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, subdirectory_names, yaml_files_in, YamlLoader};
pub use merge::{deduplicate_by_id, merge_config};
pub use settings::{ToolSettings, BATCH_SIZE_ENV, BUILD_DIR_ENV};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::{Mapping, Value};
