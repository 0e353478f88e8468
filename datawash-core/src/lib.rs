//! # datawash-core: Tabular Data Cleaning Pipeline
//!
//! Loads a CSV or spreadsheet file, infers a semantic type per column, scores data
//! quality, and repairs the data in a fixed sequence of stages:
//!
//! 1. **Imputation**: neighbour-based for numeric columns, mode for discrete ones
//! 2. **Outlier handling**: anomaly audit, IQR capping, column-name business rules
//! 3. **Deduplication**: exact duplicate rows, first occurrence kept
//!
//! Every corrective action is recorded in an ordered [`CleaningLog`], and the run ends
//! with before/after [`QualitySnapshot`]s in a [`PipelineResult`].

// Foundation
pub mod config;
pub mod dataset;
pub mod error;

// Input and analysis
pub mod loader;
pub mod profile;
pub mod schema;

// Cleaning stages
pub mod cleaning_log;
pub mod dedup;
pub mod impute;
pub mod outliers;
pub mod rules;

pub mod pipeline;

// Re-exports
pub use cleaning_log::{CleaningLog, Confidence, EntryKind, LogEntry};
pub use config::{CleaningConfig, load_config};
pub use dataset::{Dataset, StorageType, Value};
pub use error::{CleanError, RunFailure};
pub use loader::load_dataset;
pub use pipeline::{CleaningPipeline, CleaningStage, PipelineResult, PipelineStage, PipelineState};
pub use profile::{QualitySnapshot, profile};
pub use schema::{ColumnDescriptor, Schema, SemanticType, infer_schema};
