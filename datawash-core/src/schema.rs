//! Semantic type inference and per-column statistics.
//!
//! Each column is classified by a fixed precedence of checks, first match wins:
//! stored temporal type, text parsing as dates, stored numeric type, text parsing as
//! numbers, boolean token set, high uniqueness (identifier), low cardinality
//! (categorical), otherwise free text. Inference is deterministic for a given dataset.

use crate::config::SchemaConfig;
use crate::dataset::{Dataset, StorageType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Inferred semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Boolean,
    Datetime,
    Id,
    Text,
    Unknown,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Boolean => "boolean",
            SemanticType::Datetime => "datetime",
            SemanticType::Id => "id",
            SemanticType::Text => "text",
            SemanticType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Summary statistics of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Sample standard deviation; absent below two values.
    pub std: Option<f64>,
}

/// Cardinality bucket of a categorical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    High,
    Low,
}

/// Frequency of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub value: Value,
    pub count: usize,
}

/// Summary of a categorical column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    pub categories: Vec<CategoryCount>,
    pub cardinality: Cardinality,
}

/// Type-specific statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStats {
    None,
    Numeric(NumericSummary),
    Categorical(CategoricalSummary),
}

/// Metadata for one column, computed once from the original dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dtype: StorageType,
    pub inferred_type: SemanticType,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub sample_values: Vec<Value>,
    pub stats: ColumnStats,
}

/// Inferred schema of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: usize,
    pub column_count: usize,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of columns with the given semantic type, in column order.
    pub fn columns_of(&self, kind: SemanticType) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.inferred_type == kind)
            .map(|c| c.name.as_str())
            .collect()
    }
}

const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1", "t"];
const FALSE_TOKENS: &[&str] = &["false", "no", "n", "0", "f"];

/// Truth value of a boolean token, compared case-insensitively.
pub fn truth_value(token: &str) -> Option<bool> {
    let lowered = token.trim().to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Infer the schema of a dataset.
pub fn infer_schema(dataset: &Dataset, config: &SchemaConfig) -> Schema {
    let columns = (0..dataset.column_count())
        .map(|c| analyze_column(dataset, c, config))
        .collect();
    Schema {
        columns,
        row_count: dataset.row_count(),
        column_count: dataset.column_count(),
    }
}

fn analyze_column(dataset: &Dataset, column: usize, config: &SchemaConfig) -> ColumnDescriptor {
    let rows = dataset.row_count();
    let null_count = dataset.null_count(column);
    let counts = value_counts(dataset.column(column));
    let inferred_type = infer_column_type(dataset, column, config);

    let stats = match inferred_type {
        SemanticType::Numeric => ColumnStats::Numeric(numeric_summary(dataset, column)),
        SemanticType::Categorical => ColumnStats::Categorical(CategoricalSummary {
            categories: counts
                .iter()
                .take(config.top_categories)
                .map(|(value, count)| CategoryCount {
                    value: (*value).clone(),
                    count: *count,
                })
                .collect(),
            cardinality: if counts.len() > config.categorical_max_distinct {
                Cardinality::High
            } else {
                Cardinality::Low
            },
        }),
        _ => ColumnStats::None,
    };

    ColumnDescriptor {
        name: dataset.columns()[column].clone(),
        dtype: dataset.storage_type(column),
        inferred_type,
        null_count,
        null_percentage: if rows > 0 {
            null_count as f64 / rows as f64 * 100.0
        } else {
            0.0
        },
        unique_count: counts.len(),
        sample_values: dataset
            .column(column)
            .filter(|v| !v.is_null())
            .take(config.sample_values)
            .cloned()
            .collect(),
        stats,
    }
}

/// Classify one column.
pub fn infer_column_type(dataset: &Dataset, column: usize, config: &SchemaConfig) -> SemanticType {
    let non_null: Vec<&Value> = dataset.column(column).filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return SemanticType::Unknown;
    }

    let storage = dataset.storage_type(column);
    if storage.is_temporal() {
        return SemanticType::Datetime;
    }

    let sample = || non_null.iter().take(config.type_sample_size);
    if storage.is_textual() && sample().all(|v| parses_as_datetime(v)) {
        return SemanticType::Datetime;
    }

    if storage.is_numeric() {
        return SemanticType::Numeric;
    }

    if storage.is_textual() && sample().all(|v| v.as_f64().is_some()) {
        return SemanticType::Numeric;
    }

    // Distinct members are counted as truth values, so `yes`/`true` are one member.
    let truths: Option<HashSet<bool>> = non_null
        .iter()
        .map(|v| truth_value(&v.to_string()))
        .collect();
    if truths.is_some_and(|t| t.len() <= 2) {
        return SemanticType::Boolean;
    }

    let distinct = non_null.iter().collect::<HashSet<_>>().len();
    let total = dataset.row_count();
    if total > 0 && distinct as f64 / total as f64 > config.id_uniqueness_threshold {
        return SemanticType::Id;
    }

    if distinct < config.categorical_max_distinct {
        SemanticType::Categorical
    } else {
        SemanticType::Text
    }
}

fn parses_as_datetime(value: &Value) -> bool {
    match value {
        Value::DateTime(_) => true,
        Value::Text(s) => parse_datetime(s).is_some(),
        _ => false,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// General-purpose date parser covering ISO 8601 / RFC 3339, RFC 2822 and common
/// day-first, month-first and written-month layouts.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn numeric_summary(dataset: &Dataset, column: usize) -> NumericSummary {
    let values: Vec<f64> = dataset.column(column).filter_map(Value::as_f64).collect();
    if values.is_empty() {
        return NumericSummary {
            min: None,
            max: None,
            mean: None,
            std: None,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() > 1 {
        Some((values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt())
    } else {
        None
    };
    NumericSummary {
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
        mean: Some(mean),
        std,
    }
}

/// Non-null value frequencies, most frequent first; ties keep first-seen order.
pub fn value_counts<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<(&'a Value, usize)> {
    let mut index: HashMap<&Value, usize> = HashMap::new();
    let mut counts: Vec<(&Value, usize)> = Vec::new();
    for value in values.filter(|v| !v.is_null()) {
        match index.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
