//! Exact duplicate-row removal.

use crate::cleaning_log::{CleaningLog, Confidence};
use crate::dataset::{Dataset, Value};
use crate::error::CleanError;
use crate::pipeline::{CleaningStage, PipelineState, StageOutput};
use std::collections::HashSet;

/// Removes rows that repeat an earlier row across all columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator;

impl Deduplicator {
    /// Keep the first occurrence of each row in original order. Returns the input
    /// unchanged with an empty log when there is nothing to remove.
    pub fn deduplicate(&self, dataset: &Dataset) -> (Dataset, CleaningLog) {
        let mut log = CleaningLog::new();
        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(dataset.row_count());
        let mut out = dataset.clone();
        out.retain_rows(|row| seen.insert(row.to_vec()));

        let removed = dataset.row_count() - out.row_count();
        if removed > 0 {
            log.correction(
                "Removed duplicates",
                format!(
                    "{removed} duplicate rows removed, {} rows remaining",
                    out.row_count()
                ),
                Confidence::High,
            );
        }
        (out, log)
    }
}

impl CleaningStage for Deduplicator {
    fn name(&self) -> &'static str {
        "deduplicating"
    }

    fn apply(&self, state: PipelineState) -> Result<StageOutput, CleanError> {
        let (dataset, log) = self.deduplicate(&state.dataset);
        Ok(StageOutput {
            state: PipelineState {
                dataset,
                schema: state.schema,
            },
            log,
        })
    }
}
