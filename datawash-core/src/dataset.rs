//! In-memory tabular dataset: ordered, uniquely named columns over rows of scalar values.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single cell value.
///
/// Equality and hashing are total so whole rows can be compared exactly: floats compare
/// by bit pattern (with `-0.0` folded onto `0.0`), and an integral float equals the
/// integer with the same value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value. Text is parsed, so `"12.5"` yields `Some(12.5)`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Build a numeric cell, keeping integer storage when the column was integral and the
    /// value has no fractional part.
    pub fn numeric(value: f64, prefer_int: bool) -> Value {
        if prefer_int && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Value::Int(value as i64)
        } else {
            Value::Float(value)
        }
    }

    fn canonical_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                match (self.canonical_int(), other.canonical_int()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 1u8.hash(state),
            Value::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => match self.canonical_int() {
                Some(i) => {
                    0u8.hash(state);
                    i.hash(state);
                }
                None => {
                    3u8.hash(state);
                    float_bits(*f).hash(state);
                }
            },
            Value::DateTime(dt) => {
                4u8.hash(state);
                dt.hash(state);
            }
            Value::Text(s) => {
                5u8.hash(state);
                s.hash(state);
            }
        }
    }
}

fn float_bits(f: f64) -> u64 {
    if f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Physical storage type of a column, derived from the values it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Int64,
    Float64,
    Bool,
    DateTime,
    Object,
}

impl StorageType {
    pub fn is_numeric(self) -> bool {
        matches!(self, StorageType::Int64 | StorageType::Float64)
    }

    pub fn is_temporal(self) -> bool {
        self == StorageType::DateTime
    }

    pub fn is_textual(self) -> bool {
        self == StorageType::Object
    }

    /// Dataframe-style dtype label.
    pub fn label(self) -> &'static str {
        match self {
            StorageType::Int64 => "int64",
            StorageType::Float64 => "float64",
            StorageType::Bool => "bool",
            StorageType::DateTime => "datetime64[ns]",
            StorageType::Object => "object",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered rows over uniquely named, ordered columns.
///
/// Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset. Duplicate column names get `.1`, `.2` suffixes and short rows are
    /// padded with nulls (long rows truncated) to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = unique_headers(columns);
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Build a dataset column by column. Columns shorter than the longest are padded with
    /// nulls.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<Value>)>) -> Self {
        let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut rows = vec![Vec::with_capacity(columns.len()); height];
        for (name, values) in columns {
            names.push(name.into());
            let mut values = values.into_iter();
            for row in rows.iter_mut() {
                row.push(values.next().unwrap_or(Value::Null));
            }
        }
        Self::new(names, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column in row order.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub(crate) fn set_cell(&mut self, row: usize, column: usize, value: Value) {
        self.rows[row][column] = value;
    }

    pub(crate) fn retain_rows<F: FnMut(&[Value]) -> bool>(&mut self, mut keep: F) {
        self.rows.retain(|row| keep(row));
    }

    pub fn null_count(&self, column: usize) -> usize {
        self.column(column).filter(|v| v.is_null()).count()
    }

    /// Storage type derived from the column's non-null values. An all-null column reports
    /// `float64`, matching how dataframe readers type an empty column.
    pub fn storage_type(&self, column: usize) -> StorageType {
        let mut seen_int = false;
        let mut seen_float = false;
        let mut seen_bool = false;
        let mut seen_datetime = false;
        let mut seen_text = false;
        for value in self.column(column) {
            match value {
                Value::Null => {}
                Value::Int(_) => seen_int = true,
                Value::Float(_) => seen_float = true,
                Value::Bool(_) => seen_bool = true,
                Value::DateTime(_) => seen_datetime = true,
                Value::Text(_) => seen_text = true,
            }
        }
        let numeric = seen_int || seen_float;
        match (numeric, seen_bool, seen_datetime, seen_text) {
            (true, false, false, false) if seen_float => StorageType::Float64,
            (true, false, false, false) => StorageType::Int64,
            (false, true, false, false) => StorageType::Bool,
            (false, false, true, false) => StorageType::DateTime,
            (false, false, false, false) => StorageType::Float64,
            _ => StorageType::Object,
        }
    }

    /// Rough in-memory footprint in bytes.
    pub fn estimated_bytes(&self) -> usize {
        let cell = std::mem::size_of::<Value>();
        self.rows
            .iter()
            .flatten()
            .map(|v| match v {
                Value::Text(s) => cell + s.len(),
                _ => cell,
            })
            .sum::<usize>()
            + self.columns.iter().map(|c| c.len()).sum::<usize>()
    }
}

/// Make header names unique and non-empty.
pub fn unique_headers(columns: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());
    for (i, name) in columns.into_iter().enumerate() {
        let trimmed = name.trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", i + 1)
        } else {
            trimmed.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
