//! Outlier handling: anomaly audit, IQR capping and business-rule corrections.
//!
//! Three passes run in order. The isolation-forest pass only counts and logs anomalous
//! rows; the IQR and business-rule passes modify values. A column whose statistics
//! cannot be computed is skipped with a warning and the remaining columns are processed.

pub mod isolation;

use crate::cleaning_log::{CleaningLog, Confidence};
use crate::config::{BusinessRuleConfig, OutlierConfig};
use crate::dataset::{Dataset, StorageType, Value};
use crate::error::CleanError;
use crate::pipeline::{CleaningStage, PipelineState, StageOutput};
use crate::rules::BusinessRules;
use crate::schema::{Schema, SemanticType};
use isolation::{IsolationForest, quantile};

/// Outcome of capping one column to its IQR fences.
#[derive(Debug, Clone, PartialEq)]
pub struct IqrCapping {
    pub capped: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Corrects anomalous numeric values.
#[derive(Debug, Clone, Default)]
pub struct OutlierHandler {
    config: OutlierConfig,
    rules: BusinessRules,
}

impl OutlierHandler {
    pub fn new(config: OutlierConfig, rules: BusinessRuleConfig) -> Self {
        Self {
            config,
            rules: BusinessRules::new(rules),
        }
    }

    /// Run all three passes, returning the corrected copy and log entries.
    pub fn handle(&self, dataset: &Dataset, schema: &Schema) -> (Dataset, CleaningLog) {
        let mut working = dataset.clone();
        let mut log = CleaningLog::new();
        let numeric: Vec<usize> = schema
            .columns_of(SemanticType::Numeric)
            .into_iter()
            .filter_map(|name| dataset.column_index(name))
            .collect();

        self.audit_anomalies(&working, &numeric, &mut log);

        for &column in &numeric {
            let name = &dataset.columns()[column];
            match cap_column(&mut working, column, self.config.iqr_multiplier) {
                Ok(capping) if capping.capped > 0 => {
                    log.correction(
                        "Outlier capping",
                        format!(
                            "capped {} values in '{name}' to bounds [{:.2}, {:.2}]",
                            capping.capped, capping.lower, capping.upper
                        ),
                        Confidence::High,
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(column = %name, error = %e, "skipping IQR capping");
                }
            }
        }

        log.extend(self.rules.apply(&mut working, schema));
        (working, log)
    }

    fn audit_anomalies(&self, dataset: &Dataset, numeric: &[usize], log: &mut CleaningLog) {
        let complete: Vec<usize> = numeric
            .iter()
            .copied()
            .filter(|&c| dataset.null_count(c) == 0)
            .collect();
        let rows = dataset.row_count();
        if complete.is_empty() || rows < self.config.min_anomaly_rows {
            tracing::debug!(
                rows,
                columns = complete.len(),
                "not enough complete numeric data for anomaly detection"
            );
            return;
        }

        let matrix: Option<Vec<Vec<f64>>> = dataset
            .rows()
            .iter()
            .map(|row| complete.iter().map(|&c| row[c].as_f64()).collect())
            .collect();
        let Some(matrix) = matrix else {
            tracing::warn!("numeric columns hold non-numeric values, skipping anomaly detection");
            return;
        };
        if matrix.iter().flatten().any(|v| !v.is_finite()) {
            tracing::warn!("numeric columns hold non-finite values, skipping anomaly detection");
            return;
        }

        let forest = IsolationForest::fit(
            &matrix,
            self.config.n_estimators,
            self.config.max_samples,
            self.config.seed,
        );
        let flagged = forest
            .flag(&matrix, self.config.contamination)
            .into_iter()
            .filter(|f| *f)
            .count();
        let names = complete
            .iter()
            .map(|&c| dataset.columns()[c].as_str())
            .collect::<Vec<_>>()
            .join(", ");
        log.audit(
            "Anomaly detection",
            format!(
                "Isolation Forest flagged {flagged} of {rows} rows as potential anomalies across [{names}]; values left unchanged"
            ),
            Confidence::Medium,
        );
    }
}

impl CleaningStage for OutlierHandler {
    fn name(&self) -> &'static str {
        "outlier_handling"
    }

    fn apply(&self, state: PipelineState) -> Result<StageOutput, CleanError> {
        let schema = state.require_schema(self.name())?;
        let (dataset, log) = self.handle(&state.dataset, &schema);
        Ok(StageOutput {
            state: PipelineState {
                dataset,
                schema: Some(schema),
            },
            log,
        })
    }
}

/// Clamp the values of one column to `[Q1 - m*IQR, Q3 + m*IQR]`.
pub fn cap_column(
    dataset: &mut Dataset,
    column: usize,
    multiplier: f64,
) -> Result<IqrCapping, CleanError> {
    let name = dataset.columns()[column].clone();
    let mut values = Vec::with_capacity(dataset.row_count());
    for value in dataset.column(column).filter(|v| !v.is_null()) {
        let number = value
            .as_f64()
            .ok_or_else(|| CleanError::column_stats(&name, format!("non-numeric value '{value}'")))?;
        values.push(number);
    }
    if values.is_empty() {
        return Err(CleanError::column_stats(&name, "no observed values"));
    }
    values.sort_by(f64::total_cmp);

    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - multiplier * iqr;
    let upper = q3 + multiplier * iqr;
    if !lower.is_finite() || !upper.is_finite() {
        return Err(CleanError::column_stats(&name, "bounds are not finite"));
    }

    let integral = dataset.storage_type(column) == StorageType::Int64;
    let mut capped = 0;
    for row in 0..dataset.row_count() {
        let Some(v) = dataset.rows()[row][column].as_f64() else {
            continue;
        };
        let bound = if v < lower {
            lower
        } else if v > upper {
            upper
        } else {
            continue;
        };
        dataset.set_cell(row, column, Value::numeric(bound, integral));
        capped += 1;
    }

    Ok(IqrCapping {
        capped,
        lower,
        upper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::infer_schema;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn test_iqr_caps_extreme_value() {
        let mut ds = Dataset::from_columns(vec![("x", ints(&[1, 2, 3, 4, 100]))]);
        let capping = cap_column(&mut ds, 0, 1.5).unwrap();
        // Q1 = 2, Q3 = 4, IQR = 2 -> bounds [-1, 7].
        assert_eq!(
            capping,
            IqrCapping {
                capped: 1,
                lower: -1.0,
                upper: 7.0
            }
        );
        assert_eq!(ds.rows()[4][0], Value::Int(7));
    }

    #[test]
    fn test_iqr_fractional_bound_on_int_column_becomes_float() {
        let mut ds = Dataset::from_columns(vec![("x", ints(&[1, 2, 3, 4, 5, 6, 7, 8, 100]))]);
        let capping = cap_column(&mut ds, 0, 1.5).unwrap();
        // Q1 = 3, Q3 = 7, IQR = 4 -> upper 13.
        assert_eq!(capping.upper, 13.0);
        assert_eq!(ds.rows()[8][0], Value::Int(13));

        let mut ds = Dataset::from_columns(vec![("x", ints(&[1, 2, 4, 100]))]);
        let capping = cap_column(&mut ds, 0, 1.5).unwrap();
        assert_eq!(ds.rows()[3][0], Value::Float(capping.upper));
    }

    #[test]
    fn test_iqr_skips_nulls_and_reports_empty_columns() {
        let mut ds = Dataset::from_columns(vec![("x", vec![Value::Null, Value::Null])]);
        let err = cap_column(&mut ds, 0, 1.5).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_failed_column_does_not_stop_others() {
        let ds = Dataset::from_columns(vec![
            ("a", ints(&[1, 2, 3, 4, 100])),
            ("b", ints(&[10, 20, 30, 40, 1000])),
        ]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let mut broken = ds.clone();
        broken.set_cell(0, 0, Value::Text("oops".into()));

        let (out, log) = OutlierHandler::default().handle(&broken, &schema);
        assert_eq!(out.rows()[0][0], Value::Text("oops".into()));
        assert_eq!(out.rows()[4][1], Value::Int(70));
        assert_eq!(log.len(), 1);
        assert!(log.lines()[0].starts_with("Outlier capping: capped 1 values in 'b'"));
    }

    fn audited(log: &CleaningLog) -> bool {
        log.lines().iter().any(|l| l.starts_with("Anomaly detection"))
    }

    #[test]
    fn test_anomaly_audit_needs_enough_rows() {
        let ds = Dataset::from_columns(vec![("x", ints(&[1, 2, 3, 4, 5]))]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (out, log) = OutlierHandler::default().handle(&ds, &schema);
        assert_eq!(out, ds);
        assert!(log.is_empty());
    }

    #[test]
    fn test_anomaly_audit_row_boundary() {
        let ten: Vec<i64> = (1..=10).collect();
        let ds = Dataset::from_columns(vec![("x", ints(&ten))]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (_, log) = OutlierHandler::default().handle(&ds, &schema);
        assert!(!audited(&log));

        let eleven: Vec<i64> = (1..=11).collect();
        let ds = Dataset::from_columns(vec![("x", ints(&eleven))]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (_, log) = OutlierHandler::default().handle(&ds, &schema);
        assert!(audited(&log));
        assert!(log.lines()[0].contains("of 11 rows"));
    }

    #[test]
    fn test_infinite_value_skips_audit_and_is_capped() {
        let mut values: Vec<Value> = (10..22).map(|i| Value::Float(i as f64)).collect();
        values.push(Value::Float(f64::INFINITY));
        let ds = Dataset::from_columns(vec![("price", values)]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (out, log) = OutlierHandler::default().handle(&ds, &schema);
        assert!(!audited(&log));
        assert!(out.rows()[12][0].as_f64().is_some_and(f64::is_finite));
    }

    #[test]
    fn test_extreme_finite_values_are_audited() {
        let mut values: Vec<Value> = (0..11).map(|i| Value::Float(i as f64)).collect();
        values.push(Value::Float(1.7e308));
        values.push(Value::Float(-1.7e308));
        let ds = Dataset::from_columns(vec![("x", values)]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (out, log) = OutlierHandler::default().handle(&ds, &schema);
        assert!(audited(&log));
        assert_eq!(out.row_count(), 13);
    }

    #[test]
    fn test_anomaly_audit_logs_without_modifying() {
        let values: Vec<Value> = (0..20).map(|i| Value::Float(10.0 + (i % 4) as f64)).collect();
        let ds = Dataset::from_columns(vec![("x", values)]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (out, log) = OutlierHandler::default().handle(&ds, &schema);
        assert_eq!(out, ds);
        assert_eq!(log.len(), 1);
        assert_eq!(log.corrections().count(), 0);
        assert!(log.lines()[0].contains("of 20 rows"));
    }

    #[test]
    fn test_stage_requires_schema() {
        let ds = Dataset::from_columns(vec![("x", ints(&[1]))]);
        let err = OutlierHandler::default()
            .apply(PipelineState::new(ds))
            .unwrap_err();
        assert!(matches!(err, CleanError::SchemaMissing { .. }));
    }
}
