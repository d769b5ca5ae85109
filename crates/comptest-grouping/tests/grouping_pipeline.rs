//! Analysis and grouping over a test tree on disk

use comptest_config::ToolSettings;
use comptest_core::{Groupability, Signature};
use comptest_grouping::{create_grouping_signature, group_by_signature, GroupKey, Grouper, ResourceAnalyzer};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_file(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Repository with shared packages i2c, spi, uart_9600, uart_19200
fn repo() -> (TempDir, ToolSettings) {
    repo_with(&["i2c", "spi", "uart_9600", "uart_19200"])
}

fn repo_with(packages: &[&str]) -> (TempDir, ToolSettings) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for package in packages {
        write_file(
            root,
            &format!("tests/test_build_components/common/{package}/esp32-idf.yaml"),
            &format!("{}:\n  - id: {package}_bus\n", package.split('_').next().unwrap()),
        );
    }

    let settings = ToolSettings::default().with_root(root);
    (dir, settings)
}

fn add_test(root: &Path, component: &str, target: &str, content: &str) {
    write_file(root, &format!("tests/components/{component}/test.{target}.yaml"), content);
}

#[test]
fn test_signature_round_trip() {
    let (dir, settings) = repo();
    add_test(
        dir.path(),
        "bme280_uart",
        "esp32-ard",
        "packages:\n  i2c: !include ../../test_build_components/common/i2c/esp32-idf.yaml\n  uart_19200: !include ../../test_build_components/common/uart_19200/esp32-idf.yaml\n",
    );

    let analyzer = ResourceAnalyzer::new(&settings);
    let analysis = analyzer.analyze_component(&settings.tests_dir.join("bme280_uart")).unwrap();
    let signature =
        create_grouping_signature(&analysis.target_resources, "esp32-ard", analyzer.catalog().known()).unwrap();
    assert_eq!(signature.as_str(), "i2c+uart_19200");
}

#[test]
fn test_identical_packages_share_signature() {
    let (dir, settings) = repo_with(&["i2c", "uart", "uart_9600", "uart_19200"]);
    for component in ["pzem", "sds011"] {
        add_test(dir.path(), component, "esp32-idf", "packages:\n  uart: uart_9600\nsensor: []\n");
    }
    add_test(dir.path(), "sim800l", "esp32-idf", "packages:\n  uart: uart_19200\nsim800l: {}\n");

    let report = ResourceAnalyzer::new(&settings).analyze_all(&settings.tests_dir).unwrap();
    let groups = group_by_signature(&report, "esp32-idf");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[&Signature::from("uart_9600")], vec!["pzem", "sds011"]);
    assert_eq!(groups[&Signature::from("uart_19200")], vec!["sim800l"]);

    let slow = report.signature("pzem", "esp32-idf").unwrap();
    let fast = report.signature("sim800l", "esp32-idf").unwrap();
    assert_ne!(slow, fast);
    assert!(!slow.is_compatible_with(&fast));
}

#[test]
fn test_no_resource_signature_iff_no_packages() {
    let (dir, settings) = repo();
    add_test(dir.path(), "template", "esp32-idf", "sensor:\n  - platform: template\n");
    add_test(dir.path(), "bh1750", "esp32-idf", "packages:\n  i2c: {}\n");

    let report = ResourceAnalyzer::new(&settings).analyze_all(&settings.tests_dir).unwrap();
    let groups = comptest_grouping::collect_groups(&report, &BTreeSet::new(), None);

    assert_eq!(groups[&GroupKey::new("esp32-idf", Signature::no_resources())], vec!["template"]);
    assert_eq!(groups[&GroupKey::new("esp32-idf", Signature::from("i2c"))], vec!["bh1750"]);
}

#[test]
fn test_missing_common_dir_still_completes() {
    let dir = TempDir::new().unwrap();
    let settings = ToolSettings::default().with_root(dir.path());
    add_test(dir.path(), "bh1750", "esp32-idf", "packages:\n  i2c: {}\n");

    let report = ResourceAnalyzer::new(&settings).analyze_all(&settings.tests_dir).unwrap();
    assert!(report.known_packages.is_empty());
    assert_eq!(report.signature("bh1750", "esp32-idf"), None);
    assert!(report.get("bh1750").unwrap().target_resources["esp32-idf"].is_empty());
}

#[test]
fn test_plan_groups_and_individual_builds() {
    let (dir, settings) = repo();
    let root = dir.path();
    add_test(root, "bh1750", "esp32-idf", "packages:\n  i2c: {}\n");
    add_test(root, "bme280", "esp32-idf", "packages:\n  i2c: {}\n");
    add_test(root, "pzem", "esp32-idf", "packages:\n  uart_9600: {}\n");
    add_test(root, "sim800l", "esp32-idf", "packages:\n  uart_19200: {}\n");
    add_test(root, "template", "esp32-idf", "sensor: []\n");
    add_test(root, "lvgl", "esp32-idf", "lvgl: {}\n");
    add_test(root, "uart", "esp32-idf", "uart:\n  - id: u\n");
    add_test(root, "custom", "esp32-idf", "sensor:\n  - id: !remove old\n");
    add_test(root, "inline_bus", "esp32-idf", "i2c:\n  - id: my_bus\n");

    let report = ResourceAnalyzer::new(&settings).analyze_all(&settings.tests_dir).unwrap();
    assert!(matches!(report.classification("lvgl"), Some(Groupability::Isolated { .. })));
    assert_eq!(report.classification("uart"), Some(&Groupability::BaseResourceProvider));
    assert_eq!(report.classification("custom"), Some(&Groupability::StructuralDirectiveUser));
    assert_eq!(report.classification("inline_bus"), Some(&Groupability::DirectResourceDefiner));

    let plan = Grouper::new(&report, &settings.group_size_limits).plan(&BTreeSet::new(), None, true);

    assert_eq!(plan.groups.len(), 1);
    let group = &plan.groups[0];
    // uart_19200 sorts before uart_9600, so it is absorbed first and the
    // uart_9600 bucket is left on its own
    assert_eq!(group.signature.as_str(), "i2c+uart_19200");
    assert_eq!(group.components, vec!["bh1750", "bme280", "sim800l", "template"]);

    let individual: Vec<_> = plan.individual.iter().map(|b| b.component.as_str()).collect();
    assert_eq!(individual, vec!["custom", "inline_bus", "lvgl", "pzem", "uart"]);
    assert_eq!(plan.builds_saved(), 3);
}

#[test]
fn test_plan_without_grouping() {
    let (dir, settings) = repo();
    add_test(dir.path(), "bh1750", "esp32-idf", "packages:\n  i2c: {}\n");
    add_test(dir.path(), "bme280", "esp32-idf", "packages:\n  i2c: {}\n");
    add_test(dir.path(), "bme280", "esp8266-ard", "packages:\n  i2c: {}\n");

    let report = ResourceAnalyzer::new(&settings).analyze_all(&settings.tests_dir).unwrap();
    let grouper = Grouper::new(&report, &settings.group_size_limits);

    let plan = grouper.plan(&BTreeSet::new(), Some("esp32"), false);
    assert!(plan.groups.is_empty());
    assert_eq!(plan.individual.len(), 2);
    assert!(plan.individual.iter().all(|b| b.target == "esp32-idf"));
}
