//! Missing-value imputation.
//!
//! Numeric columns are imputed jointly with a k-nearest-neighbour method over the
//! numeric feature space (NaN-aware Euclidean distance), falling back to per-column
//! means when the neighbour method cannot run. Categorical, text and boolean columns are
//! filled with their mode. Datetime, id and unknown columns are left untouched.

use crate::cleaning_log::{CleaningLog, Confidence};
use crate::config::{ImputationConfig, NeighborWeights};
use crate::dataset::{Dataset, Value};
use crate::error::CleanError;
use crate::pipeline::{CleaningStage, PipelineState, StageOutput};
use crate::schema::{Schema, SemanticType, value_counts};

/// Fills missing values using column-type-aware strategies.
#[derive(Debug, Clone, Default)]
pub struct Imputer {
    config: ImputationConfig,
}

impl Imputer {
    pub fn new(config: ImputationConfig) -> Self {
        Self { config }
    }

    /// Impute a dataset against its schema, returning the filled copy and log entries.
    pub fn impute(&self, dataset: &Dataset, schema: &Schema) -> (Dataset, CleaningLog) {
        let mut working = dataset.clone();
        let mut log = CleaningLog::new();

        let numeric = columns_with_missing(dataset, schema, &[SemanticType::Numeric]);
        if !numeric.is_empty() {
            let names = column_list(dataset, &numeric);
            match knn_impute(&working, &numeric, &self.config) {
                Ok(fills) => {
                    let (filled, k) = (fills.cells.len(), fills.neighbors);
                    apply_fills(&mut working, fills.cells);
                    log.correction(
                        "KNN imputation",
                        format!(
                            "filled {filled} missing values in numeric columns [{names}] using {k} nearest neighbours"
                        ),
                        Confidence::Medium,
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, columns = %names, "KNN imputation failed, using column means");
                    let cells = mean_impute(&working, &numeric);
                    let filled = cells.len();
                    apply_fills(&mut working, cells);
                    log.correction(
                        "Mean imputation (fallback)",
                        format!(
                            "filled {filled} missing values in numeric columns [{names}] with column means"
                        ),
                        Confidence::Low,
                    );
                }
            }
        }

        let discrete = columns_with_missing(
            dataset,
            schema,
            &[
                SemanticType::Categorical,
                SemanticType::Text,
                SemanticType::Boolean,
            ],
        );
        for column in discrete {
            let name = &dataset.columns()[column];
            let Some(mode) = value_counts(working.column(column))
                .first()
                .map(|(value, _)| (*value).clone())
            else {
                tracing::warn!(column = %name, "no observed values to take a mode from");
                continue;
            };
            let rows: Vec<usize> = (0..working.row_count())
                .filter(|&r| working.rows()[r][column].is_null())
                .collect();
            for &row in &rows {
                working.set_cell(row, column, mode.clone());
            }
            log.correction(
                "Mode imputation",
                format!(
                    "filled {} missing values in '{name}' with most frequent value '{mode}'",
                    rows.len()
                ),
                Confidence::High,
            );
        }

        (working, log)
    }
}

impl CleaningStage for Imputer {
    fn name(&self) -> &'static str {
        "imputing"
    }

    fn apply(&self, state: PipelineState) -> Result<StageOutput, CleanError> {
        let schema = state.require_schema(self.name())?;
        let (dataset, log) = self.impute(&state.dataset, &schema);
        Ok(StageOutput {
            state: PipelineState {
                dataset,
                schema: Some(schema),
            },
            log,
        })
    }
}

fn columns_with_missing(dataset: &Dataset, schema: &Schema, kinds: &[SemanticType]) -> Vec<usize> {
    schema
        .columns
        .iter()
        .filter(|c| kinds.contains(&c.inferred_type))
        .filter_map(|c| dataset.column_index(&c.name))
        .filter(|&i| dataset.null_count(i) > 0)
        .collect()
}

fn column_list(dataset: &Dataset, columns: &[usize]) -> String {
    columns
        .iter()
        .map(|&c| dataset.columns()[c].as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A planned write: `(row, column, value)`.
type Fill = (usize, usize, f64);

fn apply_fills(dataset: &mut Dataset, fills: Vec<Fill>) {
    for (row, column, value) in fills {
        dataset.set_cell(row, column, Value::Float(value));
    }
}

/// Result of a successful neighbour imputation.
#[derive(Debug)]
struct KnnFills {
    cells: Vec<Fill>,
    neighbors: usize,
}

/// Plan k-nearest-neighbour fills for the given numeric columns.
///
/// Distances use only the coordinates present in both rows, scaled up by the share of
/// coordinates missing. A cell with no usable donor falls back to the column mean. All
/// fills are computed from the unmodified data before any is written.
fn knn_impute(
    dataset: &Dataset,
    columns: &[usize],
    config: &ImputationConfig,
) -> Result<KnnFills, CleanError> {
    let rows = dataset.row_count();
    let k = config.max_neighbors.min(rows.saturating_sub(1));
    if k == 0 {
        return Err(CleanError::imputation(format!(
            "need at least two rows for neighbour imputation, found {rows}"
        )));
    }

    let matrix = numeric_matrix(dataset, columns)?;
    let width = columns.len() as f64;
    let mut cells = Vec::new();

    for (j, &column) in columns.iter().enumerate() {
        let donors: Vec<usize> = (0..rows).filter(|&r| matrix[r][j].is_some()).collect();
        if donors.is_empty() {
            return Err(CleanError::imputation(format!(
                "column '{}' has no observed values",
                dataset.columns()[column]
            )));
        }
        let mean = donors.iter().filter_map(|&r| matrix[r][j]).sum::<f64>() / donors.len() as f64;

        for receiver in (0..rows).filter(|&r| matrix[r][j].is_none()) {
            let mut candidates: Vec<(f64, usize)> = donors
                .iter()
                .filter_map(|&d| {
                    nan_euclidean(&matrix[receiver], &matrix[d], width).map(|dist| (dist, d))
                })
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            candidates.truncate(k);

            let value = if candidates.is_empty() {
                mean
            } else {
                weighted_mean(&candidates, |d| matrix[d][j].unwrap_or(mean), config.weights)
            };
            if !value.is_finite() {
                return Err(CleanError::imputation(format!(
                    "non-finite estimate for column '{}'",
                    dataset.columns()[column]
                )));
            }
            cells.push((receiver, column, value));
        }
    }

    Ok(KnnFills {
        cells,
        neighbors: k,
    })
}

fn numeric_matrix(dataset: &Dataset, columns: &[usize]) -> Result<Vec<Vec<Option<f64>>>, CleanError> {
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            columns
                .iter()
                .map(|&c| match &row[c] {
                    Value::Null => Ok(None),
                    value => value.as_f64().map(Some).ok_or_else(|| {
                        CleanError::imputation(format!(
                            "non-numeric value '{value}' in column '{}' at row {r}",
                            dataset.columns()[c]
                        ))
                    }),
                })
                .collect()
        })
        .collect()
}

fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>], width: f64) -> Option<f64> {
    let (present, sum) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some((x.as_ref()?, y.as_ref()?)))
        .fold((0usize, 0.0f64), |(n, s), (x, y)| (n + 1, s + (x - y).powi(2)));
    (present > 0).then(|| (width / present as f64 * sum).sqrt())
}

fn weighted_mean(
    neighbours: &[(f64, usize)],
    value_of: impl Fn(usize) -> f64,
    weights: NeighborWeights,
) -> f64 {
    match weights {
        NeighborWeights::Uniform => {
            neighbours.iter().map(|&(_, d)| value_of(d)).sum::<f64>() / neighbours.len() as f64
        }
        NeighborWeights::Distance => {
            // Exact matches dominate: average them alone when any exist.
            let exact: Vec<f64> = neighbours
                .iter()
                .filter(|(dist, _)| *dist == 0.0)
                .map(|&(_, d)| value_of(d))
                .collect();
            if !exact.is_empty() {
                return exact.iter().sum::<f64>() / exact.len() as f64;
            }
            let (num, den) = neighbours.iter().fold((0.0, 0.0), |(num, den), &(dist, d)| {
                (num + value_of(d) / dist, den + 1.0 / dist)
            });
            num / den
        }
    }
}

/// Plan per-column mean fills. Values that do not parse as numbers are ignored; a column
/// without any numeric value is skipped.
fn mean_impute(dataset: &Dataset, columns: &[usize]) -> Vec<Fill> {
    let mut cells = Vec::new();
    for &column in columns {
        let observed: Vec<f64> = dataset.column(column).filter_map(Value::as_f64).collect();
        if observed.is_empty() {
            tracing::warn!(column = %dataset.columns()[column], "no numeric values to average");
            continue;
        }
        let mean = observed.iter().sum::<f64>() / observed.len() as f64;
        cells.extend(
            dataset
                .column(column)
                .enumerate()
                .filter(|(_, v)| v.is_null())
                .map(|(r, _)| (r, column, mean)),
        );
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::infer_schema;
    use pretty_assertions::assert_eq;

    fn run(ds: &Dataset) -> (Dataset, CleaningLog) {
        let schema = infer_schema(ds, &SchemaConfig::default());
        Imputer::default().impute(ds, &schema)
    }

    #[test]
    fn test_single_numeric_column_uses_mean_of_neighbours() {
        let ds = Dataset::from_columns(vec![(
            "A",
            vec![
                Value::Int(1),
                Value::Int(2),
                Value::Null,
                Value::Int(4),
                Value::Int(5),
            ],
        )]);
        let (out, log) = run(&ds);
        assert_eq!(out.row_count(), 5);
        assert_eq!(out.rows()[2][0], Value::Float(3.0));
        assert_eq!(log.len(), 1);
        assert!(log.lines()[0].contains("[A]"));
        assert!(log.lines()[0].contains("confidence: medium"));
    }

    #[test]
    fn test_neighbours_found_in_feature_space() {
        // Row 3 is closest to rows 0 and 1 on x; its y should come from them.
        let ds = Dataset::from_columns(vec![
            (
                "x",
                vec![
                    Value::Float(1.0),
                    Value::Float(1.1),
                    Value::Float(10.0),
                    Value::Float(1.05),
                    Value::Float(10.2),
                    Value::Null,
                ],
            ),
            (
                "y",
                vec![
                    Value::Float(100.0),
                    Value::Float(102.0),
                    Value::Float(500.0),
                    Value::Null,
                    Value::Float(510.0),
                    Value::Float(490.0),
                ],
            ),
        ]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let imputer = Imputer::new(ImputationConfig {
            max_neighbors: 2,
            weights: NeighborWeights::Uniform,
        });
        let (out, log) = imputer.impute(&ds, &schema);
        assert_eq!(out.rows()[3][1], Value::Float(101.0));
        assert_eq!(out.rows()[5][0], Value::Float(10.1));
        assert_eq!(log.len(), 1);
        assert!(log.lines()[0].contains("filled 2 missing values in numeric columns [x, y]"));
    }

    #[test]
    fn test_all_null_column_is_left_alone() {
        let ds = Dataset::from_columns(vec![
            ("a", vec![Value::Null]),
            ("b", vec![Value::Int(3)]),
        ]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let (out, log) = Imputer::default().impute(&ds, &schema);
        assert_eq!(out, ds);
        assert!(log.is_empty());
    }

    #[test]
    fn test_mean_fallback_when_neighbours_impossible() {
        let ds = Dataset::from_columns(vec![(
            "n",
            vec![Value::Int(2), Value::Null, Value::Int(4)],
        )]);
        let schema = infer_schema(&ds, &SchemaConfig::default());
        let imputer = Imputer::new(ImputationConfig {
            max_neighbors: 0,
            weights: NeighborWeights::Uniform,
        });
        let (out, log) = imputer.impute(&ds, &schema);
        assert_eq!(out.rows()[1][0], Value::Float(3.0));
        assert_eq!(log.len(), 1);
        assert!(log.lines()[0].starts_with("Mean imputation (fallback)"));
        assert!(log.lines()[0].contains("confidence: low"));
    }

    #[test]
    fn test_mode_with_first_seen_tie_break() {
        let ds = Dataset::from_columns(vec![(
            "region",
            vec![
                Value::Text("south".into()),
                Value::Text("north".into()),
                Value::Null,
                Value::Text("north".into()),
                Value::Text("south".into()),
                Value::Text("east".into()),
            ],
        )]);
        let (out, log) = run(&ds);
        assert_eq!(out.rows()[2][0], Value::Text("south".into()));
        assert_eq!(
            log.lines(),
            vec![
                "Mode imputation: filled 1 missing values in 'region' with most frequent value 'south' (confidence: high)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_datetime_and_id_untouched() {
        let ds = Dataset::from_columns(vec![
            (
                "when",
                vec![
                    Value::Text("2024-01-01".into()),
                    Value::Null,
                    Value::Text("2024-01-03".into()),
                ],
            ),
            (
                "code",
                vec![
                    Value::Text("A-1".into()),
                    Value::Text("A-2".into()),
                    Value::Text("A-3".into()),
                ],
            ),
        ]);
        let (out, log) = run(&ds);
        assert_eq!(out, ds);
        assert!(log.is_empty());
    }

    #[test]
    fn test_distance_weighting_prefers_closer_rows() {
        let neighbours = [(1.0, 0), (3.0, 1)];
        let values = [10.0, 20.0];
        let v = weighted_mean(&neighbours, |d| values[d], NeighborWeights::Distance);
        assert!((v - 12.5).abs() < 1e-9);
        let u = weighted_mean(&neighbours, |d| values[d], NeighborWeights::Uniform);
        assert_eq!(u, 15.0);
    }

    #[test]
    fn test_stage_requires_schema() {
        let ds = Dataset::from_columns(vec![("A", vec![Value::Int(1)])]);
        let err = Imputer::default()
            .apply(PipelineState::new(ds))
            .unwrap_err();
        assert!(matches!(err, CleanError::SchemaMissing { .. }));
    }
}
