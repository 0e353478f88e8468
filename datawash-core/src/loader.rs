//! Loading tabular files from disk into a [`Dataset`].
//!
//! Dispatches on file extension to a [`TabularSource`]. Delimited text is decoded after
//! statistical encoding detection over a leading byte sample; spreadsheets are read from
//! their first sheet with the first row as header. The file is read fully and released
//! before this module returns.

use crate::config::LoaderConfig;
use crate::dataset::{Dataset, Value};
use crate::error::CleanError;
use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use encoding_rs::{Encoding, UTF_8};
use std::path::{Path, PathBuf};

/// Recognised file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Delimited text with the given field separator.
    Delimited(u8),
    /// Excel / OpenDocument workbook.
    Spreadsheet,
}

impl FileFormat {
    /// Detect the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, CleanError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(FileFormat::Delimited(b',')),
            "tsv" => Ok(FileFormat::Delimited(b'\t')),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(FileFormat::Spreadsheet),
            _ => Err(CleanError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            }),
        }
    }
}

/// A file that can be read into a dataset.
pub trait TabularSource {
    /// Read the whole file.
    fn read(&self) -> Result<Dataset, CleanError>;

    /// Short format label for logs.
    fn format_name(&self) -> &'static str;
}

/// Delimited text source.
pub struct CsvSource<'a> {
    pub path: PathBuf,
    pub delimiter: u8,
    pub config: &'a LoaderConfig,
}

/// Excel / OpenDocument source.
pub struct SpreadsheetSource<'a> {
    pub path: PathBuf,
    pub config: &'a LoaderConfig,
}

/// Pick the source for a path.
pub fn source_for<'a>(
    path: &Path,
    config: &'a LoaderConfig,
) -> Result<Box<dyn TabularSource + 'a>, CleanError> {
    match FileFormat::from_path(path)? {
        FileFormat::Delimited(default_delimiter) => {
            let delimiter = if default_delimiter == b',' && config.csv_delimiter.is_ascii() {
                config.csv_delimiter as u8
            } else {
                default_delimiter
            };
            Ok(Box::new(CsvSource {
                path: path.to_path_buf(),
                delimiter,
                config,
            }))
        }
        FileFormat::Spreadsheet => Ok(Box::new(SpreadsheetSource {
            path: path.to_path_buf(),
            config,
        })),
    }
}

/// Load a file into a dataset.
///
/// Fails with `UnsupportedFormat` for unknown extensions, `EmptyDataset` for zero rows or
/// zero columns, and `Parse` for content that is not tabular.
pub fn load_dataset(path: &Path, config: &LoaderConfig) -> Result<Dataset, CleanError> {
    let source = source_for(path, config)?;
    let dataset = source.read()?;
    if dataset.column_count() == 0 {
        return Err(CleanError::empty("no columns found"));
    }
    if dataset.row_count() == 0 {
        return Err(CleanError::empty("file contains no data rows"));
    }
    tracing::debug!(
        path = %path.display(),
        format = source.format_name(),
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "dataset loaded"
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

impl TabularSource for CsvSource<'_> {
    fn read(&self) -> Result<Dataset, CleanError> {
        let bytes = std::fs::read(&self.path)?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CleanError::empty("file contains no data"));
        }

        let sample = &bytes[..bytes.len().min(self.config.encoding_sample_bytes)];
        let encoding = detect_encoding(sample, sample.len() == bytes.len());
        let (text, used, had_errors) = encoding.decode(&bytes);
        if had_errors {
            tracing::warn!(
                path = %self.path.display(),
                encoding = used.name(),
                "malformed byte sequences replaced while decoding"
            );
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CleanError::parse(&self.path, e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(CleanError::empty("no columns found"));
        }

        let mut raw: Vec<Vec<Option<String>>> = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| CleanError::parse(&self.path, e.to_string()))?;
            if record.len() > headers.len() {
                return Err(CleanError::parse(
                    &self.path,
                    format!(
                        "expected {} fields in line {}, saw {}",
                        headers.len(),
                        i + 2,
                        record.len()
                    ),
                ));
            }
            let mut row: Vec<Option<String>> = record
                .iter()
                .map(|cell| {
                    if is_null_token(cell, &self.config.null_tokens) {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect();
            row.resize(headers.len(), None);
            raw.push(row);
        }

        let rows = type_columns(raw, headers.len());
        Ok(Dataset::new(headers, rows))
    }

    fn format_name(&self) -> &'static str {
        "csv"
    }
}

/// Pick a decoding for the sampled bytes.
///
/// A byte-order mark wins and ASCII-only samples are UTF-8. Otherwise `chardetng` scores
/// the sample; a confident guess is used, and an unconfident one falls back to UTF-8
/// unless the sample is not valid UTF-8.
pub fn detect_encoding(sample: &[u8], complete: bool) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return encoding;
    }
    if sample.is_ascii() {
        return UTF_8;
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(sample, complete);
    let (guess, confident) = detector.guess_assess(None, true);
    if confident {
        return guess;
    }
    let valid_utf8 = match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the sample boundary is still UTF-8.
        Err(e) => !complete && e.error_len().is_none(),
    };
    if valid_utf8 { UTF_8 } else { guess }
}

fn is_null_token(cell: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|t| t == cell)
}

/// Type each column as a whole: integers, else floats, else booleans, else text.
fn type_columns(raw: Vec<Vec<Option<String>>>, width: usize) -> Vec<Vec<Value>> {
    #[derive(Clone, Copy)]
    enum ColumnKind {
        Int,
        Float,
        Bool,
        Text,
    }

    let kinds: Vec<ColumnKind> = (0..width)
        .map(|c| {
            let cells = raw.iter().filter_map(|row| row[c].as_deref());
            let mut all_int = true;
            let mut all_float = true;
            let mut all_bool = true;
            for cell in cells {
                let t = cell.trim();
                all_int &= t.parse::<i64>().is_ok();
                all_float &= t.parse::<f64>().is_ok();
                all_bool &= t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("false");
            }
            if all_int {
                ColumnKind::Int
            } else if all_float {
                ColumnKind::Float
            } else if all_bool {
                ColumnKind::Bool
            } else {
                ColumnKind::Text
            }
        })
        .collect();

    raw.into_iter()
        .map(|row| {
            row.into_iter()
                .zip(kinds.iter())
                .map(|(cell, kind)| match cell {
                    None => Value::Null,
                    Some(s) => {
                        let t = s.trim();
                        match kind {
                            ColumnKind::Int => t.parse().map(Value::Int).unwrap_or(Value::Null),
                            ColumnKind::Float => {
                                t.parse().map(Value::Float).unwrap_or(Value::Null)
                            }
                            ColumnKind::Bool => Value::Bool(t.eq_ignore_ascii_case("true")),
                            ColumnKind::Text => Value::Text(s),
                        }
                    }
                })
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Spreadsheets
// ---------------------------------------------------------------------------

impl TabularSource for SpreadsheetSource<'_> {
    fn read(&self) -> Result<Dataset, CleanError> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| CleanError::parse(&self.path, e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| CleanError::empty("workbook has no sheets"))?
            .map_err(|e| CleanError::parse(&self.path, e.to_string()))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(header_name).collect(),
            None => return Err(CleanError::empty("first sheet is empty")),
        };

        let data: Vec<Vec<Value>> = rows
            .map(|row| {
                row.iter()
                    .map(|cell| cell_to_value(cell, &self.config.null_tokens))
                    .collect()
            })
            .collect();
        Ok(Dataset::new(headers, data))
    }

    fn format_name(&self) -> &'static str {
        "spreadsheet"
    }
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert one spreadsheet cell. Integral floats become integers, as spreadsheets store
/// every number as a float.
pub fn cell_to_value(cell: &Data, null_tokens: &[String]) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if is_null_token(s, null_tokens) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Int(*f as i64),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => dt.as_datetime().map(Value::DateTime).unwrap_or(Value::Null),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Value::DateTime)
            .unwrap_or_else(|_| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => {
            tracing::warn!(error = ?e, "spreadsheet cell error read as missing");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            FileFormat::from_path(Path::new("a.CSV")).unwrap(),
            FileFormat::Delimited(b',')
        );
        assert_eq!(
            FileFormat::from_path(Path::new("a.xlsx")).unwrap(),
            FileFormat::Spreadsheet
        );
        assert!(matches!(
            FileFormat::from_path(Path::new("a.json")),
            Err(CleanError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            FileFormat::from_path(Path::new("noext")),
            Err(CleanError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_csv_column_typing() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "d.csv",
            b"id,price,active,name\n1,9.5,true,Alice\n2,,False,NA\n3,4,TRUE,Bob\n",
        );
        let ds = load_dataset(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(ds.columns(), &["id", "price", "active", "name"]);
        assert_eq!(
            ds.rows()[0],
            vec![
                Value::Int(1),
                Value::Float(9.5),
                Value::Bool(true),
                Value::Text("Alice".into())
            ]
        );
        assert_eq!(ds.rows()[1][1], Value::Null);
        assert_eq!(ds.rows()[1][3], Value::Null);
        assert_eq!(ds.storage_type(0).label(), "int64");
        assert_eq!(ds.storage_type(1).label(), "float64");
        assert_eq!(ds.storage_type(2).label(), "bool");
    }

    #[test]
    fn test_empty_file_is_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.csv", b"");
        assert!(matches!(
            load_dataset(&path, &LoaderConfig::default()),
            Err(CleanError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_header_only_is_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "header.csv", b"a,b,c\n");
        assert!(matches!(
            load_dataset(&path, &LoaderConfig::default()),
            Err(CleanError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_too_many_fields_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ragged.csv", b"a,b\n1,2\n3,4,5\n");
        assert!(matches!(
            load_dataset(&path, &LoaderConfig::default()),
            Err(CleanError::Parse { .. })
        ));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "short.csv", b"a,b\n1,2\n3\n");
        let ds = load_dataset(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(ds.rows()[1], vec![Value::Int(3), Value::Null]);
    }

    #[test]
    fn test_single_byte_encoding_is_decoded() {
        let dir = TempDir::new().unwrap();
        let mut bytes = b"produit,description\n".to_vec();
        for _ in 0..5 {
            // "Café crème,Société générale à Paris" in windows-1252
            bytes.extend_from_slice(
                b"Caf\xe9 cr\xe8me,Soci\xe9t\xe9 g\xe9n\xe9rale \xe0 Paris\n",
            );
        }
        let path = write(&dir, "latin.csv", &bytes);
        let ds = load_dataset(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(ds.row_count(), 5);
        for value in ds.column(0) {
            let Value::Text(s) = value else {
                panic!("expected text, got {value:?}")
            };
            assert!(!s.contains('\u{FFFD}'), "{s}");
            assert!(s.starts_with("Caf"));
        }
    }

    #[test]
    fn test_utf8_sample_stays_utf8() {
        assert_eq!(detect_encoding("a,b\n1,2\n".as_bytes(), true), UTF_8);
        assert_eq!(detect_encoding("naïve,café\n".as_bytes(), true), UTF_8);
    }

    #[test]
    fn test_spreadsheet_cell_conversion() {
        let tokens = LoaderConfig::default().null_tokens;
        assert_eq!(cell_to_value(&Data::Empty, &tokens), Value::Null);
        assert_eq!(cell_to_value(&Data::Float(3.0), &tokens), Value::Int(3));
        assert_eq!(cell_to_value(&Data::Float(2.5), &tokens), Value::Float(2.5));
        assert_eq!(
            cell_to_value(&Data::String("N/A".into()), &tokens),
            Value::Null
        );
        assert_eq!(
            cell_to_value(&Data::DateTimeIso("2024-03-01T10:00:00".into()), &tokens),
            Value::DateTime(
                NaiveDateTime::parse_from_str("2024-03-01 10:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_corrupt_workbook_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.xlsx", b"this is not a zip archive");
        assert!(matches!(
            load_dataset(&path, &LoaderConfig::default()),
            Err(CleanError::Parse { .. })
        ));
    }
}
