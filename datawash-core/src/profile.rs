//! Dataset-wide quality metrics and the scalar quality score.

use crate::dataset::Dataset;
use serde::Serialize;
use std::collections::HashSet;

/// Weight of completeness in the quality score.
pub const COMPLETENESS_WEIGHT: f64 = 0.6;
/// Weight of uniqueness in the quality score.
pub const UNIQUENESS_WEIGHT: f64 = 0.4;

/// Quality metrics of a dataset at one point of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySnapshot {
    pub row_count: usize,
    pub column_count: usize,
    pub total_cells: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    pub missing_percentage: f64,
    pub duplicate_percentage: f64,
    /// `100 - missing_percentage`.
    pub completeness: f64,
    /// `100 - duplicate_percentage`.
    pub uniqueness: f64,
    /// `0.6 * completeness + 0.4 * uniqueness`, in `[0, 100]`.
    pub quality_score: f64,
    pub memory_usage_bytes: usize,
}

/// Profile a dataset. Depends only on the row count, per-cell nullness and full-row
/// duplication.
pub fn profile(dataset: &Dataset) -> QualitySnapshot {
    let row_count = dataset.row_count();
    let column_count = dataset.column_count();
    let total_cells = row_count * column_count;
    let missing_cells = dataset
        .rows()
        .iter()
        .flatten()
        .filter(|v| v.is_null())
        .count();
    let duplicate_rows = count_duplicate_rows(dataset);

    let missing_percentage = percentage(missing_cells, total_cells);
    let duplicate_percentage = percentage(duplicate_rows, row_count);
    let completeness = 100.0 - missing_percentage;
    let uniqueness = 100.0 - duplicate_percentage;
    let quality_score = (completeness * COMPLETENESS_WEIGHT + uniqueness * UNIQUENESS_WEIGHT)
        .clamp(0.0, 100.0);

    QualitySnapshot {
        row_count,
        column_count,
        total_cells,
        missing_cells,
        duplicate_rows,
        missing_percentage,
        duplicate_percentage,
        completeness,
        uniqueness,
        quality_score,
        memory_usage_bytes: dataset.estimated_bytes(),
    }
}

/// Rows that exactly repeat an earlier row across all columns.
pub fn count_duplicate_rows(dataset: &Dataset) -> usize {
    let mut seen = HashSet::with_capacity(dataset.row_count());
    dataset
        .rows()
        .iter()
        .filter(|row| !seen.insert(row.as_slice()))
        .count()
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}
