//! Dependency graph: provider -> components that require it

use crate::manifest::{AutoLoad, ManifestIndex};
use comptest_config::{Mapping, Value};
use comptest_core::{TargetEnvironment, CANONICAL_ENVIRONMENTS, INTERNAL_NAME_PREFIX};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

/// Hop limit of the transitive dependents query
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Directed graph mapping a provider name to the components depending on it
///
/// Edges are idempotent, never self-loops and never start at an internal
/// (`__`-prefixed) name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for every indexed component
    ///
    /// Auto-loads are evaluated under all canonical environments so the
    /// graph holds the union of their outcomes.
    pub fn build(index: &ManifestIndex) -> Self {
        let mut graph = Self::new();

        for component in index.iter() {
            let name = component.name.as_str();
            for dependency in &component.dependencies {
                graph.add_edge(dependency, name);
            }
            graph.add_auto_load_edges(&component.auto_load, name, None);

            let empty_config = Value::Mapping(Mapping::new());
            for platform in component.platforms.values() {
                graph.add_edge(&platform.platform, name);
                for dependency in &platform.dependencies {
                    graph.add_edge(dependency, name);
                }
                graph.add_auto_load_edges(&platform.auto_load, name, Some(&empty_config));
            }
        }

        info!(
            "Built dependency graph: {} providers, {} edges",
            graph.edges.len(),
            graph.edge_count()
        );
        graph
    }

    fn add_auto_load_edges(&mut self, auto_load: &AutoLoad, dependent: &str, config: Option<&Value>) {
        for env in &CANONICAL_ENVIRONMENTS {
            for item in auto_load.resolve(env, config) {
                self.add_edge(&item, dependent);
            }
        }
    }

    /// Add `provider -> dependent`
    ///
    /// Only the first dotted segment of the provider counts. Returns whether
    /// a new edge was added.
    pub fn add_edge(&mut self, provider: &str, dependent: &str) -> bool {
        let provider = provider_name(provider);
        if provider.is_empty() || provider.starts_with(INTERNAL_NAME_PREFIX) || provider == dependent {
            return false;
        }
        let added = self
            .edges
            .entry(provider.to_string())
            .or_default()
            .insert(dependent.to_string());
        if added {
            debug!("Edge {} -> {}", provider, dependent);
        }
        added
    }

    pub fn contains_edge(&self, provider: &str, dependent: &str) -> bool {
        self.edges
            .get(provider)
            .map_or(false, |dependents| dependents.contains(dependent))
    }

    /// Components depending on `provider` directly
    pub fn direct_dependents(&self, provider: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(provider)
    }

    /// Transitive dependents of `name`, at most [`DEFAULT_MAX_DEPTH`] hops away
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.dependents_within(name, DEFAULT_MAX_DEPTH)
    }

    /// Transitive dependents of `name`, at most `max_depth` hops away, sorted
    ///
    /// `name` itself is never part of the result, even when it sits on a
    /// cycle and so depends on itself transitively.
    pub fn dependents_within(&self, name: &str, max_depth: usize) -> Vec<String> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([(name, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(dependents) = self.edges.get(current) else {
                continue;
            };
            for dependent in dependents {
                if dependent != name && found.insert(dependent.as_str()) {
                    queue.push_back((dependent.as_str(), depth + 1));
                }
            }
        }

        found.into_iter().map(str::to_string).collect()
    }

    /// Provider names in sorted order
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// First dotted segment of a dependency
fn provider_name(dependency: &str) -> &str {
    dependency.split('.').next().unwrap_or(dependency)
}

/// Every component the given ones need, including themselves
///
/// Follows dependencies and no-target auto-loads until nothing new is found.
/// Names missing from the index are kept but not expanded.
pub fn all_dependencies<I, S>(index: &ManifestIndex, names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result: BTreeSet<String> = BTreeSet::new();
    let mut pending: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();

    while let Some(name) = pending.pop() {
        if !result.insert(name.clone()) {
            continue;
        }
        let Some(component) = index.get(&name) else {
            continue;
        };
        let loaded = component.auto_load.resolve(&TargetEnvironment::NO_TARGET, None);
        for dependency in component.dependencies.iter().chain(loaded.iter()) {
            let provider = provider_name(dependency);
            if !provider.starts_with(INTERNAL_NAME_PREFIX) && !result.contains(provider) {
                pending.push(provider.to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ComponentManifest, PlatformManifest};
    use comptest_core::{Framework, Platform};

    fn index_of(components: Vec<ComponentManifest>) -> ManifestIndex {
        let mut index = ManifestIndex::new();
        for component in components {
            index.register(component).unwrap();
        }
        index
    }

    #[test]
    fn test_wifi_mdns_scenario() {
        let index = index_of(vec![
            ComponentManifest::new("wifi").with_auto_load(AutoLoad::Fixed(vec!["mdns".to_string()])),
            ComponentManifest::new("mdns"),
        ]);
        let graph = DependencyGraph::build(&index);

        assert!(graph.contains_edge("mdns", "wifi"));
        assert_eq!(graph.dependents("mdns"), vec!["wifi"]);
        assert!(graph.dependents("wifi").is_empty());
    }

    #[test]
    fn test_dotted_dependency_uses_first_segment() {
        let index = index_of(vec![
            ComponentManifest::new("bme280").with_dependencies(["i2c", "sensor.internal"]),
        ]);
        let graph = DependencyGraph::build(&index);
        assert!(graph.contains_edge("i2c", "bme280"));
        assert!(graph.contains_edge("sensor", "bme280"));
        assert!(graph.direct_dependents("sensor.internal").is_none());
    }

    #[test]
    fn test_self_loops_and_internal_names_skipped() {
        let mut graph = DependencyGraph::new();
        assert!(!graph.add_edge("wifi", "wifi"));
        assert!(!graph.add_edge("__internal", "wifi"));
        assert!(graph.add_edge("network", "wifi"));
        assert!(!graph.add_edge("network", "wifi"));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_auto_load_union_over_environments() {
        let index = index_of(vec![ComponentManifest::new("web_server").with_auto_load(
            AutoLoad::computed(|env, _config| match (env.framework, env.platform) {
                (Some(Framework::Arduino), _) => vec!["async_tcp".to_string()],
                (_, Some(Platform::Esp8266)) => vec!["esp8266_pwm".to_string()],
                _ => vec!["json".to_string()],
            }),
        )]);
        let graph = DependencyGraph::build(&index);

        for provider in ["async_tcp", "esp8266_pwm", "json"] {
            assert!(graph.contains_edge(provider, "web_server"), "missing {provider}");
        }
    }

    #[test]
    fn test_platform_files_get_empty_config() {
        let platform = PlatformManifest::new("sensor")
            .with_dependencies(["i2c"])
            .with_auto_load(AutoLoad::computed(|_env, config| match config {
                Some(Value::Mapping(_)) => vec!["sensirion_common".to_string()],
                _ => Vec::new(),
            }));
        let index = index_of(vec![
            ComponentManifest::new("sensor").platform_component(),
            ComponentManifest::new("sht3xd").with_platform(platform),
        ]);
        let graph = DependencyGraph::build(&index);

        assert!(graph.contains_edge("sensor", "sht3xd"));
        assert!(graph.contains_edge("i2c", "sht3xd"));
        assert!(graph.contains_edge("sensirion_common", "sht3xd"));
    }

    #[test]
    fn test_dependents_depth_bound() {
        let mut graph = DependencyGraph::new();
        for i in 0..15 {
            graph.add_edge(&format!("c{i}"), &format!("c{}", i + 1));
        }
        assert_eq!(graph.dependents("c0").len(), DEFAULT_MAX_DEPTH);
        assert_eq!(graph.dependents_within("c0", 2), vec!["c1", "c2"]);
    }

    #[test]
    fn test_dependents_handles_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "a");
        assert_eq!(graph.dependents("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_all_dependencies_fixpoint() {
        let index = index_of(vec![
            ComponentManifest::new("api").with_dependencies(["network"]),
            ComponentManifest::new("network").with_auto_load(AutoLoad::Fixed(vec!["socket".to_string()])),
            ComponentManifest::new("socket"),
            ComponentManifest::new("unrelated"),
        ]);
        let all = all_dependencies(&index, ["api"]);
        assert_eq!(
            all.into_iter().collect::<Vec<_>>(),
            vec!["api", "network", "socket"]
        );
    }
}
