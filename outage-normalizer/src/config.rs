use serde::Deserialize;
use std::{collections::BTreeMap, fs, ops::Range, path::PathBuf};

use crate::{sinks::output_path, sources::ColumnLabels};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid year range {start}..{stop}: start must be before stop")]
    EmptyRange { start: i32, stop: i32 },
    #[error("inference.max_in_flight must be at least 1")]
    NoConcurrency,
    #[error("environment variable {0} is not set")]
    MissingCredential(String),
}

/// Reporting years to process, `start_year` inclusive, `stop_year` exclusive.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PeriodsConfig {
    pub start_year: i32,
    pub stop_year: i32,
}

impl PeriodsConfig {
    pub fn range(&self) -> Range<i32> {
        self.start_year..self.stop_year
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub original_dir: PathBuf,
    pub normalized_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            original_dir: PathBuf::from("data/original"),
            normalized_dir: PathBuf::from("data/normalized"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    /// Upper bound on concurrent inference requests per phase.
    pub max_in_flight: usize,
    pub timeout_ms: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini-2024-07-18".to_string(),
            max_in_flight: 8,
            timeout_ms: 30_000,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl InferenceConfig {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// Column scanned for the first non-empty cell to find the header row.
    pub header_reference_column: usize,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            header_reference_column: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub textfile_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub periods: PeriodsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub spreadsheet: SpreadsheetConfig,
    #[serde(default)]
    pub columns: ColumnLabels,
    /// Per-year column labels, keyed by year (`[column_overrides.2003]`).
    #[serde(default)]
    pub column_overrides: BTreeMap<String, ColumnLabels>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("NORMALIZER_CONFIG").unwrap_or_else(|_| "normalizer-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg = AppConfig::from_toml_str(&contents)?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periods.start_year >= self.periods.stop_year {
            return Err(ConfigError::EmptyRange {
                start: self.periods.start_year,
                stop: self.periods.stop_year,
            });
        }
        if self.inference.max_in_flight == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        Ok(())
    }

    pub fn labels_for(&self, year: i32) -> ColumnLabels {
        self.column_overrides
            .get(&year.to_string())
            .cloned()
            .unwrap_or_else(|| self.columns.clone())
    }

    pub fn output_path(&self) -> PathBuf {
        output_path(&self.paths.normalized_dir, self.periods.start_year, self.periods.stop_year)
    }
}
