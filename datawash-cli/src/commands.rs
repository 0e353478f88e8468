//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::job::{JobDir, JobRecord, JobStatus};
use crate::upload::UploadLimits;
use datawash_core::{CleaningConfig, CleaningPipeline, Dataset, PipelineResult};
use std::path::{Path, PathBuf};

/// Rows shown by `datawash profile`.
const PREVIEW_ROWS: usize = 5;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Clean { file, out, json } => handle_clean(&file, &out, json, workspace),
        Commands::Profile { file } => handle_profile(&file, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<CleaningConfig> {
    datawash_core::config::load_config(Some(workspace))
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn handle_clean(file: &Path, out: &Path, json: bool, workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let limits = UploadLimits::load(workspace)?;
    let (record, dir) = run_job(file, out, config, &limits)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_summary(&record, &dir);
    }

    match (record.status, &record.error_message) {
        (JobStatus::Failed, Some(message)) => anyhow::bail!("{}", message),
        (JobStatus::Failed, None) => anyhow::bail!("job {} failed", record.job_id),
        _ => Ok(()),
    }
}

/// Validate the input, run the pipeline and persist the artifacts.
///
/// An invalid upload is rejected before a job exists. Once the job directory is created,
/// a failing run still yields `Ok` with a failed record written to `job.json`.
pub fn run_job(
    file: &Path,
    out: &Path,
    config: CleaningConfig,
    limits: &UploadLimits,
) -> anyhow::Result<(JobRecord, PathBuf)> {
    let file_size = limits.validate_file(file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let mut record = JobRecord::new(filename, file_size);
    let dir = JobDir::create(out, &record.job_id)?;
    dir.write_record(&record)?;
    tracing::info!(job_id = %record.job_id, file = %file.display(), "job queued");

    record.start();
    dir.write_record(&record)?;

    match process(file, &dir, config, limits) {
        Ok(result) => {
            record.complete(&result);
            tracing::info!(
                job_id = %record.job_id,
                quality_score = result.quality_score,
                rows = result.cleaned.row_count(),
                "job complete"
            );
        }
        Err(e) => {
            tracing::error!(job_id = %record.job_id, error = %e, "job failed");
            record.fail(e.to_string());
        }
    }
    dir.write_record(&record)?;
    Ok((record, dir.path().to_path_buf()))
}

fn process(
    file: &Path,
    dir: &JobDir,
    config: CleaningConfig,
    limits: &UploadLimits,
) -> anyhow::Result<PipelineResult> {
    let result = CleaningPipeline::new(config).run(file)?;
    limits.check_rows(result.before.row_count)?;
    dir.write_cleaned(&result.cleaned)?;
    dir.write_log(&result.log)?;
    Ok(result)
}

fn print_summary(record: &JobRecord, dir: &Path) {
    println!("Job {} ({:?})", record.job_id, record.status);
    if let Some(message) = &record.error_message {
        println!("  Error: {}", message);
        return;
    }
    if let (Some(before), Some(after)) = (record.quality_before, record.quality_score) {
        println!("  Quality score: {:.1} -> {}", before, after);
    }
    if let Some(rows) = record.rows_count {
        println!("  Rows: {}", rows);
    }
    println!("  Output: {}", dir.display());
}

fn handle_profile(file: &Path, workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let report = profile_report(file, &config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Schema, quality snapshot and a short preview of a file, as JSON.
pub fn profile_report(file: &Path, config: &CleaningConfig) -> anyhow::Result<serde_json::Value> {
    let dataset = datawash_core::load_dataset(file, &config.loader)?;
    let schema = datawash_core::infer_schema(&dataset, &config.schema);
    let stats = datawash_core::profile(&dataset);
    Ok(serde_json::json!({
        "filename": file.file_name().map(|n| n.to_string_lossy().into_owned()),
        "schema": schema,
        "stats": stats,
        "preview": preview(&dataset, PREVIEW_ROWS)?,
    }))
}

fn preview(dataset: &Dataset, rows: usize) -> anyhow::Result<Vec<serde_json::Value>> {
    dataset
        .rows()
        .iter()
        .take(rows)
        .map(|row| -> anyhow::Result<serde_json::Value> {
            let mut object = serde_json::Map::new();
            for (name, value) in dataset.columns().iter().zip(row) {
                object.insert(name.clone(), serde_json::to_value(value)?);
            }
            Ok(serde_json::Value::Object(object))
        })
        .collect()
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = datawash_core::config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let toml_str = render_config(&CleaningConfig::default(), &UploadLimits::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            let limits = UploadLimits::load(workspace)?;
            println!("{}", render_config(&config, &limits)?);
            Ok(())
        }
    }
}

fn render_config(config: &CleaningConfig, limits: &UploadLimits) -> anyhow::Result<String> {
    let mut toml_str = toml::to_string_pretty(config)?;
    toml_str.push_str("\n[upload]\n");
    toml_str.push_str(&toml::to_string_pretty(limits)?);
    Ok(toml_str)
}
