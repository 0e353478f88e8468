//! Configuration for the cleaning pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace config ->
//! environment. Every default equals the documented pipeline policy, so an absent config
//! file changes nothing.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// File loading.
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Semantic type inference.
    #[serde(default)]
    pub schema: SchemaConfig,
    /// Missing-value imputation.
    #[serde(default)]
    pub imputation: ImputationConfig,
    /// Anomaly detection and IQR capping.
    #[serde(default)]
    pub outliers: OutlierConfig,
    /// Column-name business rules.
    #[serde(default)]
    pub rules: BusinessRuleConfig,
}

/// File loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Number of leading bytes sampled for encoding detection.
    #[serde(default = "default_encoding_sample")]
    pub encoding_sample_bytes: usize,
    /// Field delimiter for delimited text files.
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
    /// Cell contents read as missing values.
    #[serde(default = "default_null_tokens")]
    pub null_tokens: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            encoding_sample_bytes: default_encoding_sample(),
            csv_delimiter: default_delimiter(),
            null_tokens: default_null_tokens(),
        }
    }
}

fn default_encoding_sample() -> usize {
    10_000
}

fn default_delimiter() -> char {
    ','
}

fn default_null_tokens() -> Vec<String> {
    [
        "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
        "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Semantic type inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Leading non-null values tried as dates and numbers.
    #[serde(default = "default_type_sample")]
    pub type_sample_size: usize,
    /// Distinct/total ratio above which a column is an identifier.
    #[serde(default = "default_id_threshold")]
    pub id_uniqueness_threshold: f64,
    /// Distinct count below which a column is categorical.
    #[serde(default = "default_categorical_max")]
    pub categorical_max_distinct: usize,
    /// Category frequencies kept per categorical column.
    #[serde(default = "default_top_categories")]
    pub top_categories: usize,
    /// Sample values kept per column.
    #[serde(default = "default_sample_values")]
    pub sample_values: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            type_sample_size: default_type_sample(),
            id_uniqueness_threshold: default_id_threshold(),
            categorical_max_distinct: default_categorical_max(),
            top_categories: default_top_categories(),
            sample_values: default_sample_values(),
        }
    }
}

fn default_type_sample() -> usize {
    100
}

fn default_id_threshold() -> f64 {
    0.95
}

fn default_categorical_max() -> usize {
    50
}

fn default_top_categories() -> usize {
    10
}

fn default_sample_values() -> usize {
    3
}

/// Imputation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationConfig {
    /// Upper bound on nearest neighbours; the effective count is `min(max, rows - 1)`.
    #[serde(default = "default_neighbors")]
    pub max_neighbors: usize,
    /// How neighbour values are combined.
    #[serde(default)]
    pub weights: NeighborWeights,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            max_neighbors: default_neighbors(),
            weights: NeighborWeights::default(),
        }
    }
}

/// Weighting of neighbour values in KNN imputation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborWeights {
    /// Every neighbour counts equally.
    #[default]
    Uniform,
    /// Neighbours count by inverse distance.
    Distance,
}

fn default_neighbors() -> usize {
    5
}

/// Outlier handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Expected share of anomalous rows for the isolation forest.
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Minimum complete numeric rows before anomaly detection runs.
    #[serde(default = "default_min_anomaly_rows")]
    pub min_anomaly_rows: usize,
    /// Trees in the isolation forest.
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    /// Subsample size per tree.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Seed for the isolation forest; fixed so runs are reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// IQR fence multiplier.
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            min_anomaly_rows: default_min_anomaly_rows(),
            n_estimators: default_estimators(),
            max_samples: default_max_samples(),
            seed: default_seed(),
            iqr_multiplier: default_iqr_multiplier(),
        }
    }
}

fn default_contamination() -> f64 {
    0.1
}

fn default_min_anomaly_rows() -> usize {
    11
}

fn default_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_seed() -> u64 {
    42
}

fn default_iqr_multiplier() -> f64 {
    1.5
}

/// Business rule configuration. Keywords match column names as case-insensitive
/// substrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRuleConfig {
    /// Columns whose values may not be negative.
    #[serde(default = "default_monetary_keywords")]
    pub monetary_keywords: Vec<String>,
    /// Columns whose sentinel values are legacy errors.
    #[serde(default = "default_quantity_keywords")]
    pub quantity_keywords: Vec<String>,
    /// Legacy error sentinels in quantity columns.
    #[serde(default = "default_sentinels")]
    pub quantity_sentinels: Vec<i64>,
}

impl Default for BusinessRuleConfig {
    fn default() -> Self {
        Self {
            monetary_keywords: default_monetary_keywords(),
            quantity_keywords: default_quantity_keywords(),
            quantity_sentinels: default_sentinels(),
        }
    }
}

fn default_monetary_keywords() -> Vec<String> {
    ["revenue", "sales", "price", "cost", "amount"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_quantity_keywords() -> Vec<String> {
    ["quantity", "qty", "count"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sentinels() -> Vec<i64> {
    vec![999, 9999, 99999]
}

/// Workspace-relative location of the config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".datawash").join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "datawash", "datawash")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `DATAWASH_`, sections split on `__`)
/// 2. Workspace-local config (`.datawash/config.toml`)
/// 3. User config (`~/.config/datawash/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<CleaningConfig, Box<figment::Error>> {
    figment(workspace).extract().map_err(Box::new)
}

/// The layered figment behind [`load_config`], for callers that extract their own
/// sections from the same sources.
pub fn figment(workspace: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(CleaningConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DATAWASH_OUTLIERS__CONTAMINATION, DATAWASH_IMPUTATION__MAX_NEIGHBORS, ...
    figment.merge(Env::prefixed("DATAWASH_").split("__"))
}
