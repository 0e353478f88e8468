//! Job bookkeeping and the artifacts written for each cleaning run.

use chrono::{DateTime, Utc};
use datawash_core::{CleaningLog, Dataset, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CLEANED_DATA_FILE: &str = "cleaned_data.csv";
pub const CLEANING_LOG_FILE: &str = "cleaning_log.txt";
pub const JOB_FILE: &str = "job.json";

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

/// Summary persisted as `job.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub filename: String,
    /// Input size in bytes.
    pub file_size: Option<u64>,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    pub rows_count: Option<usize>,
    /// Final quality score, truncated to an integer.
    pub quality_score: Option<i64>,
    pub quality_before: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between start and completion.
    pub processing_time: Option<f64>,
    pub error_message: Option<String>,
}

impl JobRecord {
    pub fn new(filename: impl Into<String>, file_size: u64) -> Self {
        let created_at = Utc::now();
        Self {
            job_id: new_job_id(created_at),
            filename: filename.into(),
            file_size: Some(file_size),
            status: JobStatus::Queued,
            progress: 0,
            rows_count: None,
            quality_score: None,
            quality_before: None,
            created_at,
            started_at: None,
            completed_at: None,
            processing_time: None,
            error_message: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, result: &PipelineResult) {
        self.status = JobStatus::Complete;
        self.progress = 100;
        self.rows_count = Some(result.cleaned.row_count());
        self.quality_score = Some(result.quality_score as i64);
        self.quality_before = Some(result.before.quality_score);
        self.finish();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.finish();
    }

    fn finish(&mut self) {
        let completed = Utc::now();
        self.completed_at = Some(completed);
        self.processing_time = self
            .started_at
            .map(|started| (completed - started).num_milliseconds() as f64 / 1000.0);
    }
}

/// `<UTC yyyymmddHHMMSS>_<8 hex chars>`.
pub fn new_job_id(now: DateTime<Utc>) -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", now.format("%Y%m%d%H%M%S"), &unique[..8])
}

/// Directory holding one job's artifacts.
#[derive(Debug, Clone)]
pub struct JobDir {
    path: PathBuf,
}

impl JobDir {
    pub fn create(out: &Path, job_id: &str) -> anyhow::Result<Self> {
        let path = out.join(job_id);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_record(&self, record: &JobRecord) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(self.path.join(JOB_FILE), json)?;
        Ok(())
    }

    /// Header row followed by one line per row; missing values are empty fields.
    pub fn write_cleaned(&self, dataset: &Dataset) -> anyhow::Result<PathBuf> {
        let path = self.path.join(CLEANED_DATA_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(dataset.columns())?;
        for row in dataset.rows() {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// One entry per line.
    pub fn write_log(&self, log: &CleaningLog) -> anyhow::Result<PathBuf> {
        let path = self.path.join(CLEANING_LOG_FILE);
        std::fs::write(&path, log.to_text())?;
        Ok(path)
    }
}
