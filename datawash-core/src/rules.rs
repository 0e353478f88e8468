//! Column-name business rules.
//!
//! Columns are matched by case-insensitive substring against two keyword tables. The
//! match is a heuristic: an unrelated column such as `discount_code` still matches
//! `count`. A column matching both tables gets both corrections, monetary first.

use crate::cleaning_log::{CleaningLog, Confidence};
use crate::config::BusinessRuleConfig;
use crate::dataset::{Dataset, StorageType, Value};
use crate::schema::{Schema, SemanticType};

/// Applies the monetary and quantity-sentinel rules.
#[derive(Debug, Clone, Default)]
pub struct BusinessRules {
    config: BusinessRuleConfig,
}

impl BusinessRules {
    pub fn new(config: BusinessRuleConfig) -> Self {
        Self { config }
    }

    /// Correct the dataset in place and return one log entry per corrected column and rule.
    pub fn apply(&self, dataset: &mut Dataset, schema: &Schema) -> CleaningLog {
        let mut log = CleaningLog::new();
        let numeric: Vec<usize> = schema
            .columns_of(SemanticType::Numeric)
            .into_iter()
            .filter_map(|name| dataset.column_index(name))
            .collect();

        for &column in &numeric {
            let name = dataset.columns()[column].clone();
            if matches_any(&name, &self.config.monetary_keywords) {
                let reset = reset_negatives(dataset, column);
                if reset > 0 {
                    log.correction(
                        "Negative value correction",
                        format!("reset {reset} negative values in '{name}' to 0"),
                        Confidence::High,
                    );
                }
            }
            if matches_any(&name, &self.config.quantity_keywords) {
                match self.replace_sentinels(dataset, column) {
                    Some((replaced, median)) if replaced > 0 => {
                        log.correction(
                            "Sentinel replacement",
                            format!(
                                "replaced {replaced} sentinel values ({}) in '{name}' with median {median}",
                                self.sentinel_list()
                            ),
                            Confidence::Medium,
                        );
                    }
                    Some(_) => {}
                    None => {
                        tracing::warn!(column = %name, "no non-sentinel values to take a median from");
                    }
                }
            }
        }
        log
    }

    /// Replace sentinel values with the median of the remaining values. `None` when the
    /// column holds sentinels but nothing else.
    fn replace_sentinels(&self, dataset: &mut Dataset, column: usize) -> Option<(usize, f64)> {
        let is_sentinel = |v: f64| {
            self.config
                .quantity_sentinels
                .iter()
                .any(|&s| v == s as f64)
        };
        let sentinel_rows: Vec<usize> = (0..dataset.row_count())
            .filter(|&r| dataset.rows()[r][column].as_f64().is_some_and(is_sentinel))
            .collect();
        if sentinel_rows.is_empty() {
            return Some((0, 0.0));
        }

        let mut rest: Vec<f64> = dataset
            .column(column)
            .filter_map(Value::as_f64)
            .filter(|&v| !is_sentinel(v))
            .collect();
        if rest.is_empty() {
            return None;
        }
        rest.sort_by(f64::total_cmp);
        let median = median(&rest);

        let integral = dataset.storage_type(column) == StorageType::Int64;
        for &row in &sentinel_rows {
            dataset.set_cell(row, column, Value::numeric(median, integral));
        }
        Some((sentinel_rows.len(), median))
    }

    fn sentinel_list(&self) -> String {
        self.config
            .quantity_sentinels
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn matches_any(column: &str, keywords: &[String]) -> bool {
    let lower = column.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

fn reset_negatives(dataset: &mut Dataset, column: usize) -> usize {
    let integral = dataset.storage_type(column) == StorageType::Int64;
    let rows: Vec<usize> = (0..dataset.row_count())
        .filter(|&r| dataset.rows()[r][column].as_f64().is_some_and(|v| v < 0.0))
        .collect();
    for &row in &rows {
        dataset.set_cell(row, column, Value::numeric(0.0, integral));
    }
    rows.len()
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
