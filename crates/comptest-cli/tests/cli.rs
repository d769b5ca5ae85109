//! End-to-end runs of the comptest binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_file(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn comptest(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_comptest"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("COMPTEST_BATCH_SIZE")
        .env_remove("COMPTEST_BUILD_DIR")
        .output()
        .unwrap()
}

/// Two i2c components that disagree on the bus definition
fn repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "tests/test_build_components/common/i2c/esp32-idf.yaml",
        "i2c:\n  - id: i2c_bus\n    sda: 21\n",
    );
    write_file(
        root,
        "tests/test_build_components/build_components_base.esp32-idf.yaml",
        "esphome:\n  name: componenttest\npackages:\n  component_under_test: !include $component_test_file\n",
    );
    write_file(
        root,
        "tests/components/bh1750/test.esp32-idf.yaml",
        "packages:\n  i2c: !include ../../test_build_components/common/i2c/esp32-idf.yaml\nsensor:\n  - platform: bh1750\n    id: lux\n",
    );
    write_file(
        root,
        "tests/components/bme280/test.esp32-idf.yaml",
        "packages:\n  i2c:\n    i2c:\n      - id: i2c_bus\n        sda: 4\nsensor:\n  - platform: bme280\n    id: bme\n",
    );
    dir
}

#[test]
fn test_split_json() {
    let dir = repo();
    let output = comptest(dir.path(), &["split", "-c", r#"["bh1750","bme280","ghost"]"#, "-o", "json"]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), r#"["bh1750 bme280"]"#);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Components skipped (no test files): 1"));
}

#[test]
fn test_split_rejects_malformed_components() {
    let dir = repo();
    let output = comptest(dir.path(), &["split", "-c", "bh1750,bme280"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_plan_reports_merge_failure() {
    let dir = repo();
    let output = comptest(dir.path(), &["plan", "-t", "esp32-idf", "-f"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reproduce with: comptest merge -c bh1750,bme280 -p esp32-idf"));
}

#[test]
fn test_plan_without_grouping_writes_wrappers() {
    let dir = repo();
    let output = comptest(dir.path(), &["plan", "--no-grouping", "--json"]);
    assert!(output.status.success());

    let build_dir = dir.path().join("tests/test_build_components/build");
    for component in ["bh1750", "bme280"] {
        let wrapper = fs::read_to_string(build_dir.join(format!("{component}.test.esp32-idf.yaml"))).unwrap();
        assert!(wrapper.contains(&format!("!include ../../components/{component}/test.esp32-idf.yaml")));
    }

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["individual"].as_array().map(Vec::len), Some(2));
    assert_eq!(outcome["failures"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_merge_to_stdout() {
    let dir = repo();
    let output = comptest(dir.path(), &["merge", "-c", "bh1750", "-p", "esp32-idf"]);
    assert!(output.status.success());

    let merged: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert!(merged.get("packages").and_then(|p| p.get("i2c")).is_some());
    assert!(merged.get("esphome").is_none());
}
