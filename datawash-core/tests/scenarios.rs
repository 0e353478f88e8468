//! End-to-end cleaning scenarios driven through real files.

use std::path::PathBuf;

use datawash_core::config::{BusinessRuleConfig, LoaderConfig, SchemaConfig};
use datawash_core::profile::count_duplicate_rows;
use datawash_core::rules::BusinessRules;
use datawash_core::{
    CleanError, CleaningPipeline, Dataset, PipelineStage, SemanticType, Value, infer_schema,
    load_dataset,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn column_of(ds: &Dataset, name: &str) -> Vec<Value> {
    let index = ds.column_index(name).unwrap();
    ds.column(index).cloned().collect()
}

#[test]
fn missing_numeric_value_is_imputed() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "impute.csv", "A,label\n1,a\n2,b\n,c\n4,d\n5,e\n");

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(result.cleaned.row_count(), 5);
    let a = column_of(&result.cleaned, "A");
    let filled = a[2].as_f64().unwrap();
    assert!(filled.is_finite());
    assert_eq!(filled, 3.0);

    let imputation: Vec<String> = result
        .log
        .corrections()
        .map(|e| e.to_string())
        .filter(|line| line.contains("imputation"))
        .collect();
    assert_eq!(imputation.len(), 1);
    assert!(imputation[0].contains("[A]"));
    assert!(result.stages.contains(&PipelineStage::Imputing));
    assert!(result.quality_delta() > 0.0);
}

#[test]
fn duplicate_rows_are_removed() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("id,name\n");
    for i in [1, 2, 3, 4, 5, 6, 7, 8, 2, 5] {
        csv.push_str(&format!("{i},customer_{i}\n"));
    }
    let path = write_file(&dir, "dupes.csv", &csv);

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(result.before.duplicate_rows, 2);
    assert_eq!(result.cleaned.row_count(), 8);
    assert_eq!(count_duplicate_rows(&result.cleaned), 0);
    assert!(
        result
            .log
            .lines()
            .iter()
            .any(|l| l.contains("2 duplicate rows removed, 8 rows remaining"))
    );
    assert_eq!(result.quality_score, 100.0);
}

#[test]
fn negative_revenue_reset_by_rule_pass() {
    let ds = Dataset::from_columns(vec![(
        "Revenue",
        vec![
            Value::Int(100),
            Value::Int(250),
            Value::Int(-500),
            Value::Int(400),
        ],
    )]);
    let schema = infer_schema(&ds, &SchemaConfig::default());
    let mut out = ds.clone();
    let log = BusinessRules::new(BusinessRuleConfig::default()).apply(&mut out, &schema);

    assert_eq!(out.rows()[2][0], Value::Int(0));
    assert_eq!(log.len(), 1);
    assert!(log.lines()[0].contains("'Revenue'"));
    assert!(log.lines()[0].contains("reset 1 negative values"));
}

#[test]
fn negative_revenue_reset_in_full_run() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "revenue.csv",
        "Region,Revenue\nnorth,100\nsouth,1000\neast,-500\nwest,2000\nnorth,3000\n",
    );

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(column_of(&result.cleaned, "Revenue")[2], Value::Int(0));
    let revenue: Vec<_> = result
        .log
        .corrections()
        .filter(|e| e.details.contains("'Revenue'"))
        .collect();
    assert_eq!(revenue.len(), 1);
    assert_eq!(revenue[0].action, "Negative value correction");
}

#[test]
fn quantity_sentinel_replaced_by_median() {
    let ds = Dataset::from_columns(vec![(
        "Quantity",
        vec![
            Value::Int(5),
            Value::Int(7),
            Value::Int(999),
            Value::Int(6),
            Value::Int(8),
        ],
    )]);
    let schema = infer_schema(&ds, &SchemaConfig::default());
    let mut out = ds.clone();
    BusinessRules::default().apply(&mut out, &schema);

    let quantity = column_of(&out, "Quantity");
    assert!(!quantity.contains(&Value::Int(999)));
    assert_eq!(quantity[2], Value::Float(6.5));
}

#[test]
fn quantity_sentinel_gone_after_full_run() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "quantity.csv", "Quantity\n5\n7\n999\n6\n8\n");

    let result = CleaningPipeline::default().run(&path).unwrap();

    let quantity = column_of(&result.cleaned, "Quantity");
    assert!(quantity.iter().all(|v| v.as_f64() != Some(999.0)));
}

#[test]
fn truth_tokens_infer_boolean() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "flags.csv", "flag\ntrue\nfalse\nyes\nno\n");

    let ds = load_dataset(&path, &LoaderConfig::default()).unwrap();
    let schema = infer_schema(&ds, &SchemaConfig::default());

    assert_eq!(
        schema.get("flag").unwrap().inferred_type,
        SemanticType::Boolean
    );
}

#[test]
fn empty_file_fails_without_result() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty.csv", "");

    let failure = CleaningPipeline::default().run(&path).unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Loading);
    assert!(matches!(failure.source, CleanError::EmptyDataset { .. }));
}

#[test]
fn infinite_price_does_not_abort_run() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("price\n");
    for i in 10..22 {
        csv.push_str(&format!("{i}\n"));
    }
    csv.push_str("inf\n");
    let path = write_file(&dir, "inf.csv", &csv);

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(result.cleaned.row_count(), 13);
    let price = column_of(&result.cleaned, "price");
    assert!(price.iter().all(|v| v.as_f64().is_some_and(f64::is_finite)));
    assert!(
        !result
            .log
            .lines()
            .iter()
            .any(|l| l.starts_with("Anomaly detection"))
    );
}

#[test]
fn extreme_finite_values_do_not_abort_run() {
    let mut values: Vec<Value> = (0..11).map(|i| Value::Float(i as f64)).collect();
    values.push(Value::Float(1.7e308));
    values.push(Value::Float(-1.7e308));
    let ds = Dataset::from_columns(vec![("x", values)]);

    let result = CleaningPipeline::default().run_dataset(ds).unwrap();

    assert_eq!(result.cleaned.row_count(), 13);
    assert!(result.stages.contains(&PipelineStage::Done));
}

#[test]
fn header_only_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "header.csv", "a,b,c\n");

    let failure = CleaningPipeline::default().run(&path).unwrap_err();
    assert!(matches!(failure.source, CleanError::EmptyDataset { .. }));
}

#[test]
fn unsupported_extension_fails_at_loading() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "notes.txt", "a,b\n1,2\n");

    let failure = CleaningPipeline::default().run(&path).unwrap_err();
    assert_eq!(failure.stage, PipelineStage::Loading);
    assert!(matches!(failure.source, CleanError::UnsupportedFormat { .. }));
    assert!(failure.to_string().starts_with("Cleaning failed during loading"));
}

#[test]
fn clean_input_is_left_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("order_id,region,amount,qty\n");
    for i in 0..15 {
        let region = ["north", "south", "east"][i % 3];
        csv.push_str(&format!("{},{region},{},{}\n", 1000 + i, 20 + i % 4, 1 + i % 3));
    }
    let path = write_file(&dir, "clean.csv", &csv);
    let original = load_dataset(&path, &LoaderConfig::default()).unwrap();

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(result.cleaned, original);
    assert_eq!(result.log.corrections().count(), 0);
    assert_eq!(result.quality_delta(), 0.0);
    assert!(!result.stages.contains(&PipelineStage::Imputing));
    assert!(!result.stages.contains(&PipelineStage::Deduplicating));
    // Loaded, schema, profiled, anomaly audit.
    assert_eq!(result.log.len(), 4);
}

#[test]
fn second_run_over_cleaned_output_makes_no_corrections() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("id,name\n");
    for i in [1, 2, 3, 4, 5, 6, 7, 8, 2, 5] {
        csv.push_str(&format!("{i},customer_{i}\n"));
    }
    let path = write_file(&dir, "twice.csv", &csv);

    let pipeline = CleaningPipeline::default();
    let first = pipeline.run(&path).unwrap();
    let second = pipeline.run_dataset(first.cleaned.clone()).unwrap();

    assert_eq!(second.cleaned, first.cleaned);
    assert_eq!(second.log.corrections().count(), 0);
}

#[test]
fn stages_visited_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "order.csv", "a,b\n1,x\n,y\n1,x\n1,x\n");

    let result = CleaningPipeline::default().run(&path).unwrap();

    assert_eq!(
        result.stages,
        vec![
            PipelineStage::Loading,
            PipelineStage::SchemaInference,
            PipelineStage::ProfilingBefore,
            PipelineStage::Imputing,
            PipelineStage::OutlierHandling,
            PipelineStage::Deduplicating,
            PipelineStage::ProfilingAfter,
            PipelineStage::Done,
        ]
    );
    let actions: Vec<&str> = result
        .log
        .entries()
        .iter()
        .map(|e| e.action.as_str())
        .collect();
    assert_eq!(actions[..3], ["File loaded successfully", "Schema inferred", "Data profiled"]);
}
