//! Subcommand implementations

use crate::{AnalyzeArgs, GraphArgs, ListArgs, MergeArgs, PlanArgs, SplitArgs, SplitFormat};
use anyhow::{Context, Result};
use comptest_batch::create_batches;
use comptest_config::ToolSettings;
use comptest_core::Signature;
use comptest_graph::{DependencyGraph, ImpactAnalyzer, ManifestIndex};
use comptest_grouping::{AnalysisReport, Grouper, GroupingPlan, IndividualBuild, PlannedGroup, ResourceAnalyzer};
use comptest_merge::{discover_base_files, ArtifactWriter, BaseFile, ConfigMerger, GroupArtifact, MergeError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

const ISOLATED_BY_FLAG: &str = "Isolated with --isolate";

fn load_index(settings: &ToolSettings) -> Result<ManifestIndex> {
    ManifestIndex::load(&settings.components_dir)
        .with_context(|| format!("failed to load manifests from {}", settings.components_dir.display()))
}

fn analyze_tests(analyzer: &ResourceAnalyzer, settings: &ToolSettings) -> Result<AnalysisReport> {
    analyzer
        .analyze_all(&settings.tests_dir)
        .with_context(|| format!("failed to analyze tests in {}", settings.tests_dir.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn list_components(root: &Path, settings: &ToolSettings, args: ListArgs) -> Result<ExitCode> {
    let index = load_index(settings)?;

    if !args.changed {
        for name in index.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let files = if args.files.is_empty() {
        read_paths(std::io::stdin().lock())?
    } else {
        args.files
    };

    let graph = DependencyGraph::build(&index);
    let impact = ImpactAnalyzer::new(&index, &graph, root, settings).analyze(&files, !args.direct_only);
    if impact.all_components {
        info!("Shared test fixtures changed, listing every component");
    }
    for name in impact.components() {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Non-empty lines of `reader` as paths
fn read_paths(reader: impl BufRead) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed to read changed files")?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(PathBuf::from(line));
        }
    }
    Ok(paths)
}

pub fn graph(settings: &ToolSettings, args: GraphArgs) -> Result<ExitCode> {
    let index = load_index(settings)?;
    let graph = DependencyGraph::build(&index);

    if let Some(name) = args.dependents_of {
        let dependents = graph.dependents(&name);
        if args.json {
            print_json(&dependents)?;
        } else {
            for dependent in dependents {
                println!("{dependent}");
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.json {
        print_json(&graph)?;
    } else {
        for provider in graph.providers() {
            let dependents: Vec<&str> = graph
                .direct_dependents(provider)
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            println!("{provider} -> {}", dependents.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Per-component findings as `analyze` prints them
#[derive(Debug, Serialize)]
struct ComponentReport<'a> {
    name: &'a str,
    classification: &'a str,
    reason: String,
    /// Test target -> grouping signature (none without shared packages)
    signatures: BTreeMap<&'a str, Option<Signature>>,
}

pub fn analyze(settings: &ToolSettings, args: AnalyzeArgs) -> Result<ExitCode> {
    let analyzer = ResourceAnalyzer::new(settings);
    let report = analyze_tests(&analyzer, settings)?;
    let selected: BTreeSet<String> = args.components.iter().cloned().collect();

    if args.group {
        let plan = Grouper::new(&report, &settings.group_size_limits).plan(&selected, args.target.as_deref(), true);
        if args.json {
            print_json(&plan)?;
        } else {
            print_plan(&plan);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut rows = Vec::new();
    for (name, analysis) in &report.components {
        if !selected.is_empty() && !selected.contains(name) {
            continue;
        }
        let Some(class) = report.classification(name) else {
            continue;
        };
        let signatures = analysis
            .targets()
            .filter(|target| args.target.as_deref().map_or(true, |prefix| target.starts_with(prefix)))
            .map(|target| (target, report.signature(name, target)))
            .collect();
        rows.push(ComponentReport {
            name,
            classification: class.label(),
            reason: class.reason(),
            signatures,
        });
    }

    if args.json {
        return print_json(&rows).map(|_| ExitCode::SUCCESS);
    }
    for row in &rows {
        println!("{} [{}]", row.name, row.classification);
        if row.classification != "groupable" {
            println!("  reason: {}", row.reason);
        }
        for (target, signature) in &row.signatures {
            let shown = signature.as_ref().map_or("-", Signature::as_str);
            println!("  {target}: {shown}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &GroupingPlan) {
    println!("Grouped builds ({}):", plan.groups.len());
    for group in &plan.groups {
        println!(
            "  {} [{}]: {}",
            group.target,
            group.signature,
            group.components.join(", ")
        );
    }
    println!("Individual builds ({}):", plan.individual.len());
    for build in &plan.individual {
        println!("  {} on {}", build.component, build.target);
    }
    println!(
        "Tests: {}, builds: {}, saved: {}",
        plan.total_tests(),
        plan.build_count(),
        plan.builds_saved()
    );
}

pub fn merge(settings: &ToolSettings, args: MergeArgs) -> Result<ExitCode> {
    let merger = ConfigMerger::from_settings(settings);
    let describe = || format!("failed to merge {} for {}", args.components.join(","), args.target);

    match &args.output {
        Some(path) => {
            ArtifactWriter::new(&merger, &settings.build_dir)
                .write_merged(&args.components, &args.target, path)
                .with_context(describe)?;
        }
        None => {
            let merged = merger.merge(&args.components, &args.target).with_context(describe)?;
            print!("{}", serde_yaml::to_string(&merged)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn split(settings: &ToolSettings, args: SplitArgs) -> Result<ExitCode> {
    let components: Vec<String> =
        serde_json::from_str(&args.components).context("components must be a JSON array of names")?;
    let batch_size = args.batch_size.unwrap_or(settings.batch_size);
    if batch_size == 0 {
        anyhow::bail!("batch size must be greater than zero");
    }

    let report = analyze_tests(&ResourceAnalyzer::new(settings), settings)?;
    let schedule = create_batches(&components, &settings.tests_dir, &report, batch_size);

    let batches: Vec<String> = schedule.batches.iter().map(|b| b.to_arg()).collect();
    let encoded = serde_json::to_string(&batches)?;
    match args.output {
        SplitFormat::Json => println!("{encoded}"),
        SplitFormat::Github => println!("components={encoded}"),
    }

    eprintln!("\n{}", schedule.summary);
    Ok(ExitCode::SUCCESS)
}

/// Build that could not be prepared
#[derive(Debug, Serialize)]
struct Failure {
    components: Vec<String>,
    target: String,
    error: String,
    /// Command that repeats just this build
    reproduce: String,
}

/// Component built on its own
#[derive(Debug, Serialize)]
struct IndividualArtifact {
    component: String,
    target: String,
    path: PathBuf,
}

#[derive(Debug, Default, Serialize)]
struct PlanOutcome {
    groups: Vec<GroupArtifact>,
    individual: Vec<IndividualArtifact>,
    failures: Vec<Failure>,
    total_tests: usize,
    build_count: usize,
    builds_saved: usize,
}

/// One entry of the plan to realize
enum Job<'p> {
    Group(&'p PlannedGroup),
    Individual(&'p IndividualBuild),
}

impl Job<'_> {
    fn target(&self) -> &str {
        match self {
            Job::Group(group) => &group.target,
            Job::Individual(build) => &build.target,
        }
    }

    fn components(&self) -> Vec<String> {
        match self {
            Job::Group(group) => group.components.clone(),
            Job::Individual(build) => vec![build.component.clone()],
        }
    }

    /// Command line repeating just this build
    fn reproduce(&self) -> String {
        let components = self.components().join(",");
        match self {
            Job::Group(_) => format!("comptest merge -c {components} -p {}", self.target()),
            Job::Individual(_) => format!("comptest plan -c {components} -t {} --no-grouping", self.target()),
        }
    }
}

fn base_files_for<'b>(bases: &'b BTreeMap<String, Vec<BaseFile>>, target: &str) -> Result<&'b [BaseFile], MergeError> {
    bases
        .get(target)
        .map(Vec::as_slice)
        .filter(|files| !files.is_empty())
        .ok_or_else(|| MergeError::NoBaseFile {
            target: target.to_string(),
        })
}

fn realize(
    job: &Job<'_>,
    writer: &ArtifactWriter<'_>,
    bases: &BTreeMap<String, Vec<BaseFile>>,
    outcome: &mut PlanOutcome,
) -> Result<(), MergeError> {
    for base in base_files_for(bases, job.target())? {
        match job {
            Job::Group(group) => {
                let artifact = writer.write_group(&group.components, base)?;
                outcome.groups.push(artifact);
            }
            Job::Individual(build) => {
                let path = writer.write_individual(&build.component, base)?;
                outcome.individual.push(IndividualArtifact {
                    component: build.component.clone(),
                    target: base.target_with_version.clone(),
                    path,
                });
            }
        }
    }
    Ok(())
}

pub fn plan(mut settings: ToolSettings, args: PlanArgs) -> Result<ExitCode> {
    if let Some(dir) = args.build_dir {
        settings.build_dir = dir;
    }

    let mut analyzer = ResourceAnalyzer::new(&settings);
    analyzer.isolate(args.isolate.iter().cloned(), ISOLATED_BY_FLAG);
    let report = analyze_tests(&analyzer, &settings)?;

    let requested: BTreeSet<String> = args.components.iter().cloned().collect();
    let unknown: Vec<&String> = requested.iter().filter(|c| report.get(c).is_none()).collect();
    if !unknown.is_empty() {
        warn!("No tests found for: {:?}", unknown);
    }

    let plan =
        Grouper::new(&report, &settings.group_size_limits).plan(&requested, args.target.as_deref(), !args.no_grouping);
    let bases = discover_base_files(&settings.build_components_dir)
        .with_context(|| format!("failed to read {}", settings.build_components_dir.display()))?;

    let merger = ConfigMerger::new(settings.tests_dir.clone(), analyzer.catalog().clone());
    let writer = ArtifactWriter::new(&merger, &settings.build_dir);

    let mut outcome = PlanOutcome {
        total_tests: plan.total_tests(),
        build_count: plan.build_count(),
        builds_saved: plan.builds_saved(),
        ..PlanOutcome::default()
    };
    let jobs = plan
        .groups
        .iter()
        .map(Job::Group)
        .chain(plan.individual.iter().map(Job::Individual));

    for job in jobs {
        if let Err(e) = realize(&job, &writer, &bases, &mut outcome) {
            error!("Failed to prepare {} for {}: {}", job.components().join(", "), job.target(), e);
            outcome.failures.push(Failure {
                components: job.components(),
                target: job.target().to_string(),
                error: e.to_string(),
                reproduce: job.reproduce(),
            });
            if !args.continue_on_fail {
                break;
            }
        }
    }

    if args.json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }

    if outcome.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_outcome(outcome: &PlanOutcome) {
    println!("Grouped builds ({}):", outcome.groups.len());
    for artifact in &outcome.groups {
        println!(
            "  {} ({}): {}",
            artifact.wrapper_path.display(),
            artifact.device_name,
            artifact.components.join(", ")
        );
    }
    println!("Individual builds ({}):", outcome.individual.len());
    for artifact in &outcome.individual {
        println!("  {} ({} on {})", artifact.path.display(), artifact.component, artifact.target);
    }
    println!(
        "Tests: {}, builds: {}, saved: {}",
        outcome.total_tests, outcome.build_count, outcome.builds_saved
    );

    for failure in &outcome.failures {
        eprintln!(
            "FAILED: {} on {}: {}",
            failure.components.join(", "),
            failure.target,
            failure.error
        );
        eprintln!("  reproduce with: {}", failure.reproduce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_paths_skips_blank_lines() {
        let input = "components/wifi/wifi.cpp\n\n  tests/components/mdns/test.esp32-idf.yaml  \n";
        let paths = read_paths(input.as_bytes()).unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("components/wifi/wifi.cpp"),
                PathBuf::from("tests/components/mdns/test.esp32-idf.yaml"),
            ]
        );
    }

    #[test]
    fn test_reproduce_commands() {
        let group = PlannedGroup {
            target: "esp32-idf".to_string(),
            signature: Signature::from("i2c"),
            components: vec!["bh1750".to_string(), "bme280".to_string()],
        };
        assert_eq!(Job::Group(&group).reproduce(), "comptest merge -c bh1750,bme280 -p esp32-idf");

        let build = IndividualBuild {
            component: "lvgl".to_string(),
            target: "host".to_string(),
        };
        assert_eq!(
            Job::Individual(&build).reproduce(),
            "comptest plan -c lvgl -t host --no-grouping"
        );
    }

    #[test]
    fn test_missing_base_file() {
        let bases = BTreeMap::new();
        let result = base_files_for(&bases, "esp32-idf");
        assert!(matches!(result, Err(MergeError::NoBaseFile { target }) if target == "esp32-idf"));
    }
}
