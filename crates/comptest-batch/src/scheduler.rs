//! Weighted greedy batching
//!
//! Components that share a batching signature are kept next to each other so
//! one runner can merge them into a single build. Components that cannot be
//! merged weigh more, which spreads them over more runners.

use comptest_core::Signature;
use comptest_grouping::{test_target_of, AnalysisReport};
use indexmap::IndexSet;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Weight of a component that is built on its own
pub const ISOLATED_WEIGHT: usize = 10;

/// Weight of a component that can be merged with others
pub const GROUPABLE_WEIGHT: usize = 1;

/// Weight a component with `signature` adds to a batch
pub fn weight_of(signature: &Signature) -> usize {
    if signature.is_isolated() {
        ISOLATED_WEIGHT
    } else {
        GROUPABLE_WEIGHT
    }
}

/// Whether a component has at least one `test.<target>.yaml` document
pub fn has_test_documents(tests_dir: &Path, component: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(tests_dir.join(component)) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .any(|entry| entry.path().is_file() && test_target_of(&entry.path()).is_some())
}

/// Split requested components into those with test documents and those without
///
/// Duplicates are dropped; the first occurrence keeps its position.
pub fn partition_by_test_documents<S: AsRef<str>>(
    components: &[S],
    tests_dir: &Path,
) -> (Vec<String>, Vec<String>) {
    let requested: IndexSet<&str> = components.iter().map(AsRef::as_ref).collect();
    let mut with_tests = Vec::new();
    let mut skipped = Vec::new();

    for component in requested {
        if has_test_documents(tests_dir, component) {
            with_tests.push(component.to_string());
        } else {
            skipped.push(component.to_string());
        }
    }

    if !skipped.is_empty() {
        let mut names = skipped.clone();
        names.sort();
        info!(
            "Filtered {} components without test files: {}",
            names.len(),
            names.join(", ")
        );
    }
    (with_tests, skipped)
}

/// Signature a component is batched under
///
/// Components that may not be merged get their own `isolated_<name>`.
/// Otherwise the signature of the first target (by name) that declares shared
/// packages is used, since every target of a component normally needs the
/// same resources.
pub fn batching_signature(report: &AnalysisReport, component: &str) -> Signature {
    if !report.is_groupable(component) {
        return Signature::isolated(component);
    }

    report
        .get(component)
        .into_iter()
        .flat_map(|analysis| analysis.targets())
        .find_map(|target| report.signature(component, target))
        .unwrap_or_else(Signature::no_resources)
}

/// Components assigned to one runner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub components: Vec<String>,
    /// Sum of the component weights
    pub weight: usize,
    /// Number of components weighted as isolated
    pub isolated: usize,
}

impl Batch {
    fn push(&mut self, component: String, signature: &Signature) {
        if signature.is_isolated() {
            self.isolated += 1;
        }
        self.components.push(component);
        self.weight += weight_of(signature);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Space-separated component list, as CI jobs consume it
    pub fn to_arg(&self) -> String {
        self.components.join(" ")
    }
}

/// Packs components into weighted batches
pub struct BatchScheduler<'a> {
    report: &'a AnalysisReport,
    batch_size: usize,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(report: &'a AnalysisReport, batch_size: usize) -> Self {
        Self { report, batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Components by batching signature, in request order within a signature
    pub fn signature_groups<S: AsRef<str>>(&self, components: &[S]) -> BTreeMap<Signature, Vec<String>> {
        let mut groups: BTreeMap<Signature, Vec<String>> = BTreeMap::new();
        for component in components {
            let component = component.as_ref();
            groups
                .entry(batching_signature(self.report, component))
                .or_default()
                .push(component.to_string());
        }
        groups
    }

    /// Pack components into batches
    ///
    /// Groupable signatures come first, largest first; isolated ones last.
    /// A batch is closed when the next component would push its weight past
    /// the batch size, unless the batch is still empty.
    pub fn schedule<S: AsRef<str>>(&self, components: &[S]) -> Vec<Batch> {
        let mut groups: Vec<(Signature, Vec<String>)> = self.signature_groups(components).into_iter().collect();
        groups.sort_by(|(a_sig, a), (b_sig, b)| {
            (a_sig.is_isolated(), Reverse(a.len()), a_sig).cmp(&(b_sig.is_isolated(), Reverse(b.len()), b_sig))
        });

        let mut batches = Vec::new();
        let mut current = Batch::default();

        for (signature, members) in groups {
            let weight = weight_of(&signature);
            debug!("Scheduling {} ({} components, weight {})", signature, members.len(), weight);

            for component in members {
                if current.weight + weight > self.batch_size && !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                }
                current.push(component, &signature);
            }
        }

        if !current.is_empty() {
            batches.push(current);
        }

        info!("Created {} batches (target weight {})", batches.len(), self.batch_size);
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptest_core::Groupability;
    use comptest_grouping::ComponentAnalysis;

    fn add(report: &mut AnalysisReport, name: &str, class: Groupability, resources: &[(&str, &[&str])]) {
        let analysis = ComponentAnalysis {
            name: name.to_string(),
            target_resources: resources
                .iter()
                .map(|(target, packages)| (target.to_string(), packages.iter().map(|p| p.to_string()).collect()))
                .collect(),
            ..ComponentAnalysis::default()
        };
        report.components.insert(name.to_string(), analysis);
        report.classifications.insert(name.to_string(), class);
    }

    fn report() -> AnalysisReport {
        let mut report = AnalysisReport {
            known_packages: ["i2c", "spi", "uart_9600"].iter().map(|s| s.to_string()).collect(),
            ..AnalysisReport::default()
        };
        add(&mut report, "bme280", Groupability::Groupable, &[("esp32-ard", &[]), ("esp32-idf", &["i2c"])]);
        add(&mut report, "template", Groupability::Groupable, &[("esp32-idf", &[])]);
        add(&mut report, "lvgl", Groupability::Isolated { reason: "display".into() }, &[("host", &[])]);
        add(&mut report, "uart", Groupability::BaseResourceProvider, &[("esp32-idf", &["uart_9600"])]);
        report
    }

    #[test]
    fn test_batching_signature() {
        let report = report();
        assert_eq!(batching_signature(&report, "bme280"), Signature::from("i2c"));
        assert_eq!(batching_signature(&report, "template"), Signature::no_resources());
        assert_eq!(batching_signature(&report, "lvgl"), Signature::isolated("lvgl"));
        assert_eq!(batching_signature(&report, "uart"), Signature::isolated("uart"));
        assert_eq!(batching_signature(&report, "unknown"), Signature::isolated("unknown"));
    }

    #[test]
    fn test_weights() {
        assert_eq!(weight_of(&Signature::isolated("lvgl")), ISOLATED_WEIGHT);
        assert_eq!(weight_of(&Signature::no_resources()), GROUPABLE_WEIGHT);
        assert_eq!(weight_of(&Signature::from("i2c+spi")), GROUPABLE_WEIGHT);
    }

    #[test]
    fn test_isolated_scheduled_last() {
        let report = report();
        let batches = BatchScheduler::new(&report, 40).schedule(&["lvgl", "template", "bme280"]);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].components, vec!["bme280", "template", "lvgl"]);
        assert_eq!(batches[0].weight, 12);
        assert_eq!(batches[0].isolated, 1);
    }

    #[test]
    fn test_oversized_first_item_admitted() {
        let report = report();
        let batches = BatchScheduler::new(&report, 5).schedule(&["lvgl", "uart"]);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1 && b.weight == ISOLATED_WEIGHT));
    }

    #[test]
    fn test_empty_request() {
        let report = report();
        let components: [&str; 0] = [];
        assert!(BatchScheduler::new(&report, 40).schedule(&components).is_empty());
    }
}
