//! Configuration management for the fraud pipeline

use crate::etl::SourcePaths;
use crate::models::{ForestConfig, LogisticConfig, SvmConfig};
use crate::partition::SplitStrategy;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub sources: SourceConfig,
    pub partition: PartitionConfig,
    pub models: ModelsConfig,
    pub logging: LoggingConfig,
}

/// Where versioned artifacts are written
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the artifact store
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

/// Raw source files for the default dataset version.
///
/// Other versions live next to them with a `_{version}` suffix before the extension.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Customer profile CSV
    pub customers: PathBuf,
    /// Columnar transaction JSON
    pub transactions: PathBuf,
    /// Fraud label JSON
    pub fraud: PathBuf,
    /// Version tag served by the un-suffixed files
    pub default_version: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            customers: PathBuf::from("data_sources/customer_release.csv"),
            transactions: PathBuf::from("data_sources/transactions_release.parquet"),
            fraud: PathBuf::from("data_sources/fraud_release.json"),
            default_version: "v1.0".to_string(),
        }
    }
}

impl SourceConfig {
    /// Resolve the raw source files of a dataset version.
    pub fn locate(&self, version: &str) -> SourcePaths {
        if version == self.default_version {
            return SourcePaths {
                customers: self.customers.clone(),
                transactions: self.transactions.clone(),
                fraud: self.fraud.clone(),
            };
        }

        SourcePaths {
            customers: versioned_path(&self.customers, version),
            transactions: versioned_path(&self.transactions, version),
            fraud: versioned_path(&self.fraud, version),
        }
    }
}

fn versioned_path(base: &Path, version: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, version, ext.to_string_lossy()),
        None => format!("{}_{}", stem, version),
    };
    base.with_file_name(file_name)
}

/// Train/holdout split configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// "group" (by cc_num) or "stratified" (by label)
    pub strategy: SplitStrategy,
    /// Share of rows (or groups) reserved for the holdout
    pub holdout_fraction: f64,
    /// Seed of the split shuffle
    pub seed: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Group,
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Hyperparameters of every classifier variant
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModelsConfig {
    pub logistic_regression: LogisticConfig,
    pub random_forest: ForestConfig,
    pub svm: SvmConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the conventional location
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `SECUREBANK__*` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("SECUREBANK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        let fraction = self.partition.holdout_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            anyhow::bail!("partition.holdout_fraction must be in (0, 1), got {}", fraction);
        }
        if self.models.random_forest.n_trees == 0 {
            anyhow::bail!("models.random_forest.n_trees must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.storage.root, PathBuf::from("storage"));
        assert_eq!(config.partition.strategy, SplitStrategy::Group);
        assert_eq!(config.partition.holdout_fraction, 0.2);
        assert_eq!(config.partition.seed, 42);
        assert_eq!(config.sources.default_version, "v1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_locate_default_and_versioned_sources() {
        let sources = SourceConfig::default();

        let default = sources.locate("v1.0");
        assert_eq!(default.customers, PathBuf::from("data_sources/customer_release.csv"));

        let versioned = sources.locate("v2.0");
        assert_eq!(
            versioned.customers,
            PathBuf::from("data_sources/customer_release_v2.0.csv")
        );
        assert_eq!(
            versioned.transactions,
            PathBuf::from("data_sources/transactions_release_v2.0.parquet")
        );
        assert_eq!(versioned.fraud, PathBuf::from("data_sources/fraud_release_v2.0.json"));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[partition]\nstrategy = \"stratified\"\nseed = 7\n\n[models.random_forest]\nn_trees = 5"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.partition.strategy, SplitStrategy::Stratified);
        assert_eq!(config.partition.seed, 7);
        assert_eq!(config.partition.holdout_fraction, 0.2);
        assert_eq!(config.models.random_forest.n_trees, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_holdout_fraction_rejected() {
        let mut config = AppConfig::default();
        config.partition.holdout_fraction = 1.0;
        assert!(config.validate().is_err());
    }
}
