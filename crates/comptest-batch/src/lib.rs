//! Splitting component tests into CI batches
//!
//! Each batch becomes one CI runner. Components sharing a batching signature
//! stay together so the runner can merge them; isolated components weigh ten
//! times as much as groupable ones.

mod scheduler;
mod summary;

pub use scheduler::{
    batching_signature, has_test_documents, partition_by_test_documents, weight_of, Batch, BatchScheduler,
    GROUPABLE_WEIGHT, ISOLATED_WEIGHT,
};
pub use summary::BatchSummary;

use comptest_grouping::AnalysisReport;
use std::path::Path;

/// Result of batching a component request
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub batches: Vec<Batch>,
    /// Requested components without test documents
    pub skipped: Vec<String>,
    pub summary: BatchSummary,
}

/// Filter `components` to those with tests, then pack them into batches
pub fn create_batches<S: AsRef<str>>(
    components: &[S],
    tests_dir: &Path,
    report: &AnalysisReport,
    batch_size: usize,
) -> Schedule {
    let (with_tests, skipped) = partition_by_test_documents(components, tests_dir);
    let batches = BatchScheduler::new(report, batch_size).schedule(&with_tests);
    let summary = BatchSummary::new(components.len(), skipped.len(), &batches, batch_size);
    Schedule {
        batches,
        skipped,
        summary,
    }
}
