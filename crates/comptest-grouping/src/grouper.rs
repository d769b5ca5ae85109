//! Compatibility grouping
//!
//! Groupable components are bucketed by (test target, signature). Buckets on
//! the same target are then merged when their signatures do not conflict,
//! components without shared resources are spread over the other buckets,
//! and oversized buckets are split to respect per-target limits.

use crate::analyzer::AnalysisReport;
use comptest_core::Signature;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Bucket key: test target plus signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub target: String,
    pub signature: Signature,
}

impl GroupKey {
    pub fn new(target: impl Into<String>, signature: Signature) -> Self {
        Self {
            target: target.into(),
            signature,
        }
    }
}

/// Buckets of components, in key order
pub type Groups = BTreeMap<GroupKey, Vec<String>>;

/// Group components by signature on one target
///
/// Components without known shared packages on the target are left out.
pub fn group_by_signature(report: &AnalysisReport, target: &str) -> BTreeMap<Signature, Vec<String>> {
    let mut groups: BTreeMap<Signature, Vec<String>> = BTreeMap::new();
    for name in report.components.keys() {
        if let Some(signature) = report.signature(name, target) {
            groups.entry(signature).or_default().push(name.clone());
        }
    }
    groups
}

fn target_matches(target: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |prefix| target.starts_with(prefix))
}

/// Bucket groupable components by (target, signature)
///
/// `components` restricts the candidates (all analyzed components when
/// empty). Components without shared packages on a target get the
/// no-resource signature there.
pub fn collect_groups(report: &AnalysisReport, components: &BTreeSet<String>, target_filter: Option<&str>) -> Groups {
    let mut groups = Groups::new();

    for (name, analysis) in &report.components {
        if !components.is_empty() && !components.contains(name) {
            continue;
        }
        if !report.is_groupable(name) {
            continue;
        }
        for target in analysis.targets().filter(|t| target_matches(t, target_filter)) {
            let signature = report
                .signature(name, target)
                .unwrap_or_else(Signature::no_resources);
            groups
                .entry(GroupKey::new(target, signature))
                .or_default()
                .push(name.clone());
        }
    }

    groups
}

/// Merge buckets whose signatures are compatible, per target
///
/// Reserved (no-resource and isolated) buckets are kept as they are. The rest
/// are visited largest first, ties broken by signature; each unvisited bucket
/// seeds an accumulator that absorbs every compatible unvisited bucket until
/// none is left, its signature growing to the union of the absorbed ones.
pub fn merge_compatible(groups: Groups) -> Groups {
    let mut by_target: BTreeMap<String, Vec<(Signature, Vec<String>)>> = BTreeMap::new();
    for (key, components) in groups {
        by_target.entry(key.target).or_default().push((key.signature, components));
    }

    let mut merged = Groups::new();
    for (target, entries) in by_target {
        let (reserved, mut candidates): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|(signature, _)| signature.is_reserved());

        for (signature, components) in reserved {
            merged.insert(GroupKey::new(target.clone(), signature), components);
        }

        candidates.sort_by(|(sig_a, comps_a), (sig_b, comps_b)| {
            comps_b.len().cmp(&comps_a.len()).then_with(|| sig_a.cmp(sig_b))
        });

        let mut processed = vec![false; candidates.len()];
        for seed in 0..candidates.len() {
            if processed[seed] {
                continue;
            }
            processed[seed] = true;
            let mut signature = candidates[seed].0.clone();
            let mut members = candidates[seed].1.clone();

            loop {
                let next = (0..candidates.len())
                    .find(|&i| !processed[i] && signature.is_compatible_with(&candidates[i].0));
                let Some(index) = next else {
                    break;
                };
                processed[index] = true;
                debug!(
                    "Merging {} into {} on {}",
                    candidates[index].0, signature, target
                );
                members.extend(candidates[index].1.iter().cloned());
                signature = signature.union(&candidates[index].0);
            }

            merged
                .entry(GroupKey::new(target.clone(), signature))
                .or_default()
                .extend(members);
        }
    }

    merged
}

/// Spread no-resource components round-robin over the other buckets
///
/// Per target, the receiving buckets are the non-reserved ones in signature
/// order. Without any, the no-resource bucket stays as it is.
pub fn distribute_no_resource(mut groups: Groups) -> Groups {
    let no_resource_keys: Vec<GroupKey> = groups
        .keys()
        .filter(|key| key.signature.is_no_resources())
        .cloned()
        .collect();

    for no_resource_key in no_resource_keys {
        let receivers: Vec<GroupKey> = groups
            .keys()
            .filter(|key| key.target == no_resource_key.target && !key.signature.is_reserved())
            .cloned()
            .collect();
        if receivers.is_empty() {
            continue;
        }

        let Some(components) = groups.remove(&no_resource_key) else {
            continue;
        };
        debug!(
            "Distributing {} no-resource components over {} groups on {}",
            components.len(),
            receivers.len(),
            no_resource_key.target
        );
        for (i, component) in components.into_iter().enumerate() {
            if let Some(group) = groups.get_mut(&receivers[i % receivers.len()]) {
                group.push(component);
            }
        }
    }

    groups
}

/// Split buckets larger than their target's limit into ordered chunks
///
/// Chunks keep component order and get `_part<N>` signatures (1-based).
pub fn apply_size_limits(groups: Groups, limits: &BTreeMap<String, usize>) -> Groups {
    let mut result = Groups::new();

    for (key, components) in groups {
        let limit = limits.get(&key.target).copied().filter(|limit| *limit > 0);
        match limit {
            Some(limit) if components.len() > limit => {
                debug!(
                    "Splitting {} on {} ({} components, limit {})",
                    key.signature,
                    key.target,
                    components.len(),
                    limit
                );
                for (i, chunk) in components.chunks(limit).enumerate() {
                    let part = GroupKey::new(key.target.clone(), key.signature.with_part(i + 1));
                    result.insert(part, chunk.to_vec());
                }
            }
            _ => {
                result.insert(key, components);
            }
        }
    }

    result
}

/// One merged build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedGroup {
    pub target: String,
    pub signature: Signature,
    pub components: Vec<String>,
}

/// One component built on its own for one target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct IndividualBuild {
    pub component: String,
    pub target: String,
}

/// Result of grouping: merged builds plus the builds left to run alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingPlan {
    pub groups: Vec<PlannedGroup>,
    pub individual: Vec<IndividualBuild>,
}

impl GroupingPlan {
    /// Component tests covered by merged builds
    pub fn grouped_tests(&self) -> usize {
        self.groups.iter().map(|g| g.components.len()).sum()
    }

    /// Component tests in total
    pub fn total_tests(&self) -> usize {
        self.grouped_tests() + self.individual.len()
    }

    /// Builds actually run
    pub fn build_count(&self) -> usize {
        self.groups.len() + self.individual.len()
    }

    /// Builds avoided by merging
    pub fn builds_saved(&self) -> usize {
        self.total_tests() - self.build_count()
    }
}

/// Runs the full grouping pipeline over an analysis report
pub struct Grouper<'a> {
    report: &'a AnalysisReport,
    size_limits: &'a BTreeMap<String, usize>,
}

impl<'a> Grouper<'a> {
    pub fn new(report: &'a AnalysisReport, size_limits: &'a BTreeMap<String, usize>) -> Self {
        Self { report, size_limits }
    }

    /// Plan the builds for `components` (all when empty)
    ///
    /// With grouping disabled every component test is an individual build.
    pub fn plan(&self, components: &BTreeSet<String>, target_filter: Option<&str>, grouping: bool) -> GroupingPlan {
        let groups = if grouping {
            let groups = collect_groups(self.report, components, target_filter);
            let groups = merge_compatible(groups);
            let groups = distribute_no_resource(groups);
            apply_size_limits(groups, self.size_limits)
        } else {
            Groups::new()
        };

        let mut plan = GroupingPlan::default();
        let mut grouped: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (key, members) in &groups {
            if members.len() < 2 {
                continue;
            }
            for member in members {
                grouped.insert((member.as_str(), key.target.as_str()));
            }
            plan.groups.push(PlannedGroup {
                target: key.target.clone(),
                signature: key.signature.clone(),
                components: members.clone(),
            });
        }

        for (name, analysis) in &self.report.components {
            if !components.is_empty() && !components.contains(name) {
                continue;
            }
            for target in analysis.targets().filter(|t| target_matches(t, target_filter)) {
                if !grouped.contains(&(name.as_str(), target)) {
                    plan.individual.push(IndividualBuild {
                        component: name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        plan.individual.sort();

        info!(
            "Planned {} grouped builds covering {} tests, {} individual builds",
            plan.groups.len(),
            plan.grouped_tests(),
            plan.individual.len()
        );
        plan
    }
}
