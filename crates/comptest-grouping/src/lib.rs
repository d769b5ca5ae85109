//! Resource signature analysis and compatibility grouping
//!
//! The analyzer reads each component's test documents and records, per test
//! target, the shared resource packages it declares. Components are then
//! classified, and the groupable ones are bucketed by signature so that
//! compatible components can be built together.
//!
//! # Example
//!
//! ```ignore
//! use comptest_grouping::{Grouper, ResourceAnalyzer};
//!
//! let analyzer = ResourceAnalyzer::new(&settings);
//! let report = analyzer.analyze_all(&settings.tests_dir)?;
//! let plan = Grouper::new(&report, &settings.group_size_limits).plan(&BTreeSet::new(), None, true);
//! ```

mod analyzer;
mod grouper;
mod packages;

pub use analyzer::{
    create_grouping_signature, test_target_of, AnalysisReport, ComponentAnalysis, FileAnalysis, ResourceAnalyzer,
};
pub use grouper::{
    apply_size_limits, collect_groups, distribute_no_resource, group_by_signature, merge_compatible, GroupKey,
    Grouper, Groups, GroupingPlan, IndividualBuild, PlannedGroup,
};
pub use packages::{discover_packages, DeclaredPackages, PackageCatalog};
