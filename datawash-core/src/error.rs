//! Error types for the datawash cleaning pipeline.
//!
//! Uses `thiserror` for the stage-level [`CleanError`] and the single run-level
//! [`RunFailure`] signal handed back to callers.

use crate::pipeline::PipelineStage;
use std::path::PathBuf;

/// Errors raised by individual pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Dataset is empty: {reason}")]
    EmptyDataset { reason: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Schema has not been inferred before the {stage} stage")]
    SchemaMissing { stage: &'static str },

    #[error("Imputation failed: {message}")]
    Imputation { message: String },

    #[error("Statistics for column '{column}' could not be computed: {message}")]
    ColumnStats { column: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CleanError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn empty(reason: impl Into<String>) -> Self {
        Self::EmptyDataset {
            reason: reason.into(),
        }
    }

    pub fn imputation(message: impl Into<String>) -> Self {
        Self::Imputation {
            message: message.into(),
        }
    }

    pub fn column_stats(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ColumnStats {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Whether the pipeline degrades gracefully on this error instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Imputation { .. } | Self::ColumnStats { .. })
    }
}

/// The single cleaning-failure signal returned when a run aborts.
///
/// No partial result accompanies it; the stage tells the caller how far the run got.
#[derive(Debug, thiserror::Error)]
#[error("Cleaning failed during {stage}: {source}")]
pub struct RunFailure {
    pub stage: PipelineStage,
    #[source]
    pub source: CleanError,
}

impl RunFailure {
    pub fn new(stage: PipelineStage, source: CleanError) -> Self {
        Self { stage, source }
    }
}
