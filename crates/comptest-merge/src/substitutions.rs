//! Substitution renaming
//!
//! Every substitution a component defines is renamed to `<component>_<name>`
//! and every `$name` / `${name}` reference in its document is rewritten to
//! `${<component>_<name>}`, so documents of different components can share
//! one merged file.

use comptest_config::{Mapping, Value};
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{?(\w+)\}?").expect("valid substitution pattern"))
}

/// Rewrite every substitution reference in `text`
pub fn prefix_references_in(text: &str, prefix: &str) -> String {
    reference_pattern()
        .replace_all(text, |caps: &Captures| format!("${{{prefix}_{}}}", &caps[1]))
        .into_owned()
}

/// Rewrite every substitution reference in string scalars of the tree
pub fn prefix_references(value: Value, prefix: &str) -> Value {
    match value {
        Value::String(text) => Value::String(prefix_references_in(&text, prefix)),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| (key, prefix_references(value, prefix)))
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(|v| prefix_references(v, prefix)).collect()),
        Value::Tagged(mut tagged) => {
            let inner = std::mem::replace(&mut tagged.value, Value::Null);
            tagged.value = prefix_references(inner, prefix);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

/// Rename substitution keys to `<prefix>_<name>`
pub fn prefix_names(substitutions: Mapping, prefix: &str) -> Mapping {
    substitutions
        .into_iter()
        .map(|(key, value)| match key {
            Value::String(name) => (Value::String(format!("{prefix}_{name}")), value),
            other => (other, value),
        })
        .collect()
}

/// Whether any string scalar references substitution `name`
pub fn references(value: &Value, name: &str) -> bool {
    match value {
        Value::String(text) => reference_pattern()
            .captures_iter(text)
            .any(|caps| &caps[1] == name),
        Value::Mapping(map) => map.values().any(|v| references(v, name)),
        Value::Sequence(seq) => seq.iter().any(|v| references(v, name)),
        Value::Tagged(tagged) => references(&tagged.value, name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_prefix_both_forms() {
        assert_eq!(prefix_references_in("$name temp", "bme280"), "${bme280_name} temp");
        assert_eq!(prefix_references_in("${pin}", "bme280"), "${bme280_pin}");
        assert_eq!(prefix_references_in("no refs", "bme280"), "no refs");
    }

    #[test]
    fn test_prefix_whole_tree() {
        let doc = parse("sensor:\n  - name: ${name}\n    pin: $pin\n    lambda: !lambda return ${scale};\n    accuracy: 2\n");
        let prefixed = prefix_references(doc, "adc");
        assert_eq!(
            prefixed,
            parse("sensor:\n  - name: ${adc_name}\n    pin: ${adc_pin}\n    lambda: !lambda return ${adc_scale};\n    accuracy: 2\n")
        );
    }

    #[test]
    fn test_prefix_names() {
        let subs = parse("name: x\npin: GPIO4\n");
        let renamed = prefix_names(subs.as_mapping().unwrap().clone(), "adc");
        assert_eq!(Value::Mapping(renamed), parse("adc_name: x\nadc_pin: GPIO4\n"));
    }

    #[test]
    fn test_references() {
        let doc = parse("font:\n  - file: $component_dir/font.ttf\n");
        assert!(references(&doc, "component_dir"));
        assert!(!references(&doc, "component"));
    }
}
