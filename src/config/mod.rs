//! Run configuration
//!
//! Layered as built-in defaults, then the TOML file, then environment
//! variables, then command-line overrides applied by the binary.

use crate::client::{ServiceConfig, API_KEY_ENV};
use crate::error::{NormalizeError, Result};
use crate::ledger::LedgerRetention;
use crate::retry::RetryPolicy;
use crate::source::{RecordFilter, RecordSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file read from the working directory when `-c` is not given
pub const DEFAULT_CONFIG_FILE: &str = "normalizer.toml";

/// One dataset: where its verses come from and where results go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub source: PathBuf,
    pub ledger: PathBuf,
    #[serde(default)]
    pub filter: Option<RecordFilter>,
}

impl DatasetConfig {
    /// Dataset with the conventional `data/` and `output/` locations
    pub fn conventional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: PathBuf::from("data").join(format!("{}.csv", name)),
            ledger: PathBuf::from("output").join(format!("{}_normalised.csv", name)),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn record_source(&self) -> RecordSource {
        RecordSource::new(&self.name, &self.source).with_filter(self.filter)
    }
}

fn default_datasets() -> Vec<DatasetConfig> {
    vec![
        DatasetConfig::conventional("masoretic"),
        DatasetConfig::conventional("vulgate"),
        DatasetConfig::conventional("septuagint").with_filter(RecordFilter::PotentialDifference),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Prompt template with a single `{verse_text}` placeholder
    pub prompt_path: PathBuf,
    /// Worker count per dataset
    pub concurrency: usize,
    pub retention: LedgerRetention,
    pub show_progress: bool,
    pub log_file: PathBuf,
    pub retry: RetryPolicy,
    pub service: ServiceConfig,
    /// Processed in order
    pub datasets: Vec<DatasetConfig>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            prompt_path: PathBuf::from("prompts").join("normalization_prompt.txt"),
            concurrency: 1,
            retention: LedgerRetention::default(),
            show_progress: true,
            log_file: PathBuf::from("logs").join("normalization.log"),
            retry: RetryPolicy::default(),
            service: ServiceConfig::default(),
            datasets: default_datasets(),
        }
    }
}

impl NormalizerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NormalizeError::config(format!("invalid configuration: {}", e)))
    }

    /// Load the file at `path`; a missing file is a configuration error
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NormalizeError::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Load `explicit` if given, else `normalizer.toml` when present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_from(default_path)
                } else {
                    debug!("No {} found; using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides read through `lookup`
    pub fn merge_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(API_KEY_ENV) {
            self.service.api_key = Some(api_key);
        }

        if let Some(concurrency) = lookup("NORMALIZER_CONCURRENCY") {
            match concurrency.trim().parse::<usize>() {
                Ok(value) => self.concurrency = value,
                Err(_) => warn!(
                    "Ignoring invalid NORMALIZER_CONCURRENCY value '{}'",
                    concurrency
                ),
            }
        }

        if let Some(model) = lookup("NORMALIZER_MODEL") {
            self.service.model = model;
        }

        if let Some(prompt_path) = lookup("NORMALIZER_PROMPT_PATH") {
            self.prompt_path = PathBuf::from(prompt_path);
        }

        if let Some(log_file) = lookup("NORMALIZER_LOG_FILE") {
            self.log_file = PathBuf::from(log_file);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(NormalizeError::config("concurrency must be at least 1"));
        }

        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(NormalizeError::config("dataset name must not be empty"));
            }
            if !names.insert(dataset.name.as_str()) {
                return Err(NormalizeError::config(format!(
                    "duplicate dataset '{}'",
                    dataset.name
                )));
            }
        }

        self.retry.validate()
    }

    /// Datasets to run, in configured order. An empty selection means all.
    pub fn select_datasets(&self, names: &[String]) -> Result<Vec<DatasetConfig>> {
        if names.is_empty() {
            return Ok(self.datasets.clone());
        }

        for name in names {
            if !self.datasets.iter().any(|d| &d.name == name) {
                let known: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
                return Err(NormalizeError::config(format!(
                    "unknown dataset '{}' (configured: {})",
                    name,
                    known.join(", ")
                )));
            }
        }

        Ok(self
            .datasets
            .iter()
            .filter(|d| names.contains(&d.name))
            .cloned()
            .collect())
    }
}
