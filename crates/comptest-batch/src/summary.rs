//! Batch statistics for CI logs

use crate::scheduler::Batch;
use serde::Serialize;
use std::fmt;

/// Counts describing one scheduling run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Components asked for
    pub requested: usize,
    /// Components placed in a batch
    pub batched: usize,
    pub groupable: usize,
    pub isolated: usize,
    /// Components without test documents
    pub skipped: usize,
    pub batches: usize,
    pub batch_size: usize,
}

impl BatchSummary {
    pub fn new(requested: usize, skipped: usize, batches: &[Batch], batch_size: usize) -> Self {
        let batched: usize = batches.iter().map(Batch::len).sum();
        let isolated: usize = batches.iter().map(|b| b.isolated).sum();
        Self {
            requested,
            batched,
            groupable: batched - isolated,
            isolated,
            skipped,
            batches: batches.len(),
            batch_size,
        }
    }

    /// Mean number of components per batch, 0 without batches
    pub fn average_per_batch(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        self.batched as f64 / self.batches as f64
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch Summary ===")?;
        writeln!(f, "Total components requested: {}", self.requested)?;
        writeln!(f, "Components with test files: {}", self.batched)?;
        writeln!(f, "  - Groupable (weight=1): {}", self.groupable)?;
        writeln!(f, "  - Isolated (weight=10): {}", self.isolated)?;
        if self.skipped > 0 {
            writeln!(f, "Components skipped (no test files): {}", self.skipped)?;
        }
        writeln!(f, "Number of batches: {}", self.batches)?;
        writeln!(f, "Batch size target (weighted): {}", self.batch_size)?;
        if self.batches > 0 {
            writeln!(f, "Average components per batch: {:.1}", self.average_per_batch())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(components: &[&str], isolated: usize) -> Batch {
        Batch {
            components: components.iter().map(|s| s.to_string()).collect(),
            weight: components.len() - isolated + isolated * 10,
            isolated,
        }
    }

    #[test]
    fn test_summary_counts() {
        let batches = vec![batch(&["a", "b", "c"], 0), batch(&["d", "lvgl"], 1)];
        let summary = BatchSummary::new(7, 2, &batches, 40);

        assert_eq!(summary.batched, 5);
        assert_eq!(summary.groupable, 4);
        assert_eq!(summary.isolated, 1);
        assert_eq!(summary.batches, 2);
        assert!((summary.average_per_batch() - 2.5).abs() < f64::EPSILON);

        let text = summary.to_string();
        assert!(text.contains("Components skipped (no test files): 2"));
        assert!(text.contains("Average components per batch: 2.5"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::new(0, 0, &[], 40);
        assert_eq!(summary.average_per_batch(), 0.0);
        assert!(!summary.to_string().contains("Average"));
    }
}
