//! Pipeline orchestration.
//!
//! A run moves through a fixed sequence of stages. Each cleaning stage receives the
//! previous [`PipelineState`] by value and returns the next one together with its log
//! delta; the orchestrator owns the concatenation order of the log. Any stage error ends
//! the run with a [`RunFailure`] and no partial result.

use crate::cleaning_log::CleaningLog;
use crate::config::CleaningConfig;
use crate::dataset::Dataset;
use crate::dedup::Deduplicator;
use crate::error::{CleanError, RunFailure};
use crate::impute::Imputer;
use crate::loader::load_dataset;
use crate::outliers::OutlierHandler;
use crate::profile::{QualitySnapshot, count_duplicate_rows, profile};
use crate::schema::{Schema, infer_schema};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// States of a cleaning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Loading,
    SchemaInference,
    ProfilingBefore,
    Imputing,
    OutlierHandling,
    Deduplicating,
    ProfilingAfter,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::SchemaInference => "schema_inference",
            Self::ProfilingBefore => "profiling_before",
            Self::Imputing => "imputing",
            Self::OutlierHandling => "outlier_handling",
            Self::Deduplicating => "deduplicating",
            Self::ProfilingAfter => "profiling_after",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value handed from one stage to the next.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub dataset: Dataset,
    /// Set once schema inference has run. Describes the original dataset and is not
    /// refreshed by later stages.
    pub schema: Option<Arc<Schema>>,
}

impl PipelineState {
    /// A state before schema inference.
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            schema: None,
        }
    }

    /// The inferred schema, or [`CleanError::SchemaMissing`] naming the stage that asked.
    pub fn require_schema(&self, stage: &'static str) -> Result<Arc<Schema>, CleanError> {
        self.schema
            .clone()
            .ok_or(CleanError::SchemaMissing { stage })
    }
}

/// What a stage hands back: the next state and the log entries it produced.
#[derive(Debug)]
pub struct StageOutput {
    pub state: PipelineState,
    pub log: CleaningLog,
}

/// A transformation step of the pipeline.
pub trait CleaningStage {
    /// Stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Consume the previous state and produce the next one.
    fn apply(&self, state: PipelineState) -> Result<StageOutput, CleanError>;
}

/// The terminal artifact of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub cleaned: Dataset,
    pub log: CleaningLog,
    pub schema: Schema,
    pub before: QualitySnapshot,
    pub after: QualitySnapshot,
    /// Quality score of the cleaned dataset.
    pub quality_score: f64,
    /// States visited, in order, ending with [`PipelineStage::Done`].
    pub stages: Vec<PipelineStage>,
}

impl PipelineResult {
    pub fn quality_delta(&self) -> f64 {
        self.after.quality_score - self.before.quality_score
    }
}

/// Runs the full cleaning sequence with one configuration.
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    config: CleaningConfig,
}

impl CleaningPipeline {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Load a file and clean it.
    pub fn run(&self, path: &Path) -> Result<PipelineResult, RunFailure> {
        let span = tracing::info_span!("cleaning_run", path = %path.display());
        let _enter = span.enter();
        let started = Instant::now();

        let dataset = load_dataset(path, &self.config.loader)
            .map_err(|e| fail(PipelineStage::Loading, e))?;
        let mut log = CleaningLog::new();
        log.info(
            "File loaded successfully",
            format!(
                "{} rows, {} columns",
                dataset.row_count(),
                dataset.column_count()
            ),
        );

        let result = self.execute(dataset, log, vec![PipelineStage::Loading])?;
        tracing::info!(
            rows = result.cleaned.row_count(),
            quality_score = result.quality_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cleaning complete"
        );
        Ok(result)
    }

    /// Clean a dataset that is already in memory. The run starts at schema inference.
    pub fn run_dataset(&self, dataset: Dataset) -> Result<PipelineResult, RunFailure> {
        if dataset.is_empty() {
            return Err(fail(
                PipelineStage::Loading,
                CleanError::empty(format!(
                    "{} rows, {} columns",
                    dataset.row_count(),
                    dataset.column_count()
                )),
            ));
        }
        self.execute(dataset, CleaningLog::new(), Vec::new())
    }

    fn execute(
        &self,
        dataset: Dataset,
        mut log: CleaningLog,
        mut stages: Vec<PipelineStage>,
    ) -> Result<PipelineResult, RunFailure> {
        stages.push(PipelineStage::SchemaInference);
        let schema = Arc::new(infer_schema(&dataset, &self.config.schema));
        log.info(
            "Schema inferred",
            format!("{} columns analyzed", schema.columns.len()),
        );

        stages.push(PipelineStage::ProfilingBefore);
        let before = profile(&dataset);
        log.info(
            "Data profiled",
            format!("Quality score: {:.1}/100", before.quality_score),
        );

        let mut state = PipelineState {
            dataset,
            schema: Some(schema),
        };

        if before.missing_cells > 0 {
            let imputer = Imputer::new(self.config.imputation.clone());
            state = run_stage(PipelineStage::Imputing, &imputer, state, &mut log, &mut stages)?;
        } else {
            tracing::debug!(stage = %PipelineStage::Imputing, "no missing cells, skipping");
        }

        let handler =
            OutlierHandler::new(self.config.outliers.clone(), self.config.rules.clone());
        state = run_stage(
            PipelineStage::OutlierHandling,
            &handler,
            state,
            &mut log,
            &mut stages,
        )?;

        if count_duplicate_rows(&state.dataset) > 0 {
            state = run_stage(
                PipelineStage::Deduplicating,
                &Deduplicator,
                state,
                &mut log,
                &mut stages,
            )?;
        } else {
            tracing::debug!(stage = %PipelineStage::Deduplicating, "no duplicate rows, skipping");
        }

        stages.push(PipelineStage::ProfilingAfter);
        let after = profile(&state.dataset);
        stages.push(PipelineStage::Done);

        let delta = after.quality_score - before.quality_score;
        if delta > 0.0 {
            log.info(
                "Quality improved",
                format!(
                    "quality score {:.1} -> {:.1} (+{delta:.1})",
                    before.quality_score, after.quality_score
                ),
            );
        }

        let PipelineState { dataset, schema } = state;
        let schema = schema
            .map(Arc::unwrap_or_clone)
            .ok_or_else(|| fail(PipelineStage::Done, CleanError::SchemaMissing { stage: "done" }))?;

        Ok(PipelineResult {
            cleaned: dataset,
            log,
            schema,
            quality_score: after.quality_score,
            before,
            after,
            stages,
        })
    }
}

fn run_stage(
    stage: PipelineStage,
    runner: &dyn CleaningStage,
    state: PipelineState,
    log: &mut CleaningLog,
    stages: &mut Vec<PipelineStage>,
) -> Result<PipelineState, RunFailure> {
    stages.push(stage);
    let started = Instant::now();
    let output = runner.apply(state).map_err(|e| fail(stage, e))?;
    tracing::info!(
        stage = runner.name(),
        rows = output.state.dataset.row_count(),
        entries = output.log.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage complete"
    );
    log.extend(output.log);
    Ok(output.state)
}

fn fail(stage: PipelineStage, error: CleanError) -> RunFailure {
    tracing::error!(stage = %stage, error = %error, "cleaning run failed");
    RunFailure::new(stage, error)
}
