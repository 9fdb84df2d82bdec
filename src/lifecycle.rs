//! Versioned dataset lifecycle: raw sources → merged set → partition → features
//!
//! Each stage is persisted through the artifact store only after it completes.
//! A version is derived from its raw source files when they exist; otherwise
//! the stored artifact of that version is used.

use crate::config::{AppConfig, PartitionConfig, SourceConfig};
use crate::error::{PipelineError, Result};
use crate::etl::{self, SourcePaths};
use crate::features::{self, FeatureSet};
use crate::partition::{self, Partition};
use crate::storage::{ArtifactKind, ArtifactStore};
use crate::types::MergedSet;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DatasetLifecycle {
    store: ArtifactStore,
    sources: SourceConfig,
    partition: PartitionConfig,
}

impl DatasetLifecycle {
    pub fn new(store: ArtifactStore, sources: SourceConfig, partition: PartitionConfig) -> Self {
        Self {
            store,
            sources,
            partition,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ArtifactStore::new(&config.storage.root),
            config.sources.clone(),
            config.partition.clone(),
        )
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The requested version, or the configured default.
    pub fn resolve_version(&self, version: Option<&str>) -> String {
        match version {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => self.sources.default_version.clone(),
        }
    }

    /// Raw source files a version is read from.
    pub fn source_paths(&self, version: &str) -> SourcePaths {
        self.sources.locate(version)
    }

    fn has_raw_sources(&self, version: &str) -> bool {
        self.source_paths(version).any_exists()
    }

    /// Extract, merge and persist the raw sources of a version.
    pub fn merge(&self, version: &str) -> Result<MergedSet> {
        let paths = self.source_paths(version);
        debug!(version, customers = %paths.customers.display(), "Extracting raw sources");

        let merged = etl::transform(etl::extract(&paths)?)?;
        let description = etl::describe(&merged);
        info!(
            version,
            rows = description.shape.0,
            columns = description.shape.1,
            fraud_ratio = description.fraud_ratio,
            "Merged set described"
        );

        etl::load(&self.store, version, &merged)?;
        Ok(merged)
    }

    /// Merged set of a version: derived from raw sources when present, else the stored one.
    pub fn merged_set(&self, version: &str) -> Result<MergedSet> {
        if self.has_raw_sources(version) {
            return self.merge(version);
        }

        info!(version, "No raw sources, using stored merged set");
        self.store.load(ArtifactKind::MergedSet, version)
    }

    /// Split and persist a merged set with the configured strategy.
    pub fn split(&self, version: &str, merged: &MergedSet) -> Result<Partition> {
        let partition = partition::sample(
            merged,
            self.partition.strategy,
            self.partition.seed,
            self.partition.holdout_fraction,
        )?;
        let description = partition::describe(&partition);
        info!(
            version,
            train_cards = description.train.unique_cc_nums,
            holdout_cards = description.holdout.unique_cc_nums,
            "Partition described"
        );

        partition::load(&self.store, version, &partition)?;
        Ok(partition)
    }

    /// Partition of a version: derived from raw sources when present, else the stored one.
    pub fn partition(&self, version: &str) -> Result<Partition> {
        if self.has_raw_sources(version) {
            let merged = self.merge(version)?;
            return self.split(version, &merged);
        }

        info!(version, "No raw sources, using stored partition");
        self.store.load(ArtifactKind::Partition, version)
    }

    /// Feature set of a version: derived from raw sources when present, else the stored one.
    pub fn feature_set(&self, version: &str) -> Result<FeatureSet> {
        if self.has_raw_sources(version) {
            let merged = self.merge(version)?;
            let partition = self.split(version, &merged)?;
            let features = FeatureSet::derive(version, &partition)?;
            features::load(&self.store, &features)?;
            return Ok(features);
        }

        info!(version, "No raw sources, using stored feature set");
        self.store.load(ArtifactKind::FeatureSet, version)
    }

    /// Versions with a stored feature set.
    pub fn materialized_versions(&self) -> Result<Vec<String>> {
        self.store.list(ArtifactKind::FeatureSet)
    }
}

/// A version name is usable as a store key.
pub(crate) fn check_version(version: &str) -> Result<()> {
    if version.is_empty() || version.contains(['/', '\\']) || version.contains("..") || version.contains('@') {
        return Err(PipelineError::Validation(format!("invalid dataset version {:?}", version)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write a small raw dataset under `dir` with `cards` cards, `per_card` transactions each,
    /// flagging every `fraud_every`-th transaction.
    pub(crate) fn write_sources(dir: &Path, suffix: &str, cards: u64, per_card: usize, fraud_every: usize) {
        let mut customers = String::from("cc_num,lat,long,dob,job\n");
        for card in 0..cards {
            customers.push_str(&format!(
                "{},{},{},{},engineer\n",
                1000 + card,
                40.0 + card as f64 * 0.01,
                -75.0 - card as f64 * 0.01,
                "15/03/1980"
            ));
        }

        let (mut trans_num, mut time, mut cc_num, mut unix_time) = (vec![], vec![], vec![], vec![]);
        let (mut merchant, mut category, mut amt) = (vec![], vec![], vec![]);
        let (mut merch_lat, mut merch_long) = (vec![], vec![]);
        let mut labels = serde_json::Map::new();

        let mut n = 0usize;
        for step in 0..per_card {
            for card in 0..cards {
                let id = format!("tx{}", n);
                let fraud = fraud_every > 0 && n % fraud_every == 0;
                let seconds = 1_577_836_800i64 + (step as i64) * 3_600 * 7 + card as i64 * 60;
                let ts = chrono::DateTime::from_timestamp(seconds, 0).unwrap().naive_utc();

                trans_num.push(serde_json::json!(id));
                time.push(serde_json::json!(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
                cc_num.push(serde_json::json!(1000 + card));
                unix_time.push(serde_json::json!(seconds));
                merchant.push(serde_json::json!(format!("merchant_{}", n % 7)));
                category.push(serde_json::json!(if fraud { "shopping_net" } else { "grocery_pos" }));
                amt.push(serde_json::json!(if fraud { 900.0 + n as f64 } else { 20.0 + (n % 30) as f64 }));
                merch_lat.push(serde_json::json!(40.0 + (n % 5) as f64 * 0.1));
                merch_long.push(serde_json::json!(-75.0 - (n % 3) as f64 * 0.1));
                if fraud {
                    labels.insert(id, serde_json::json!(1));
                }
                n += 1;
            }
        }

        let transactions = serde_json::json!({
            "trans_num": trans_num,
            "trans_date_trans_time": time,
            "cc_num": cc_num,
            "unix_time": unix_time,
            "merchant": merchant,
            "category": category,
            "amt": amt,
            "merch_lat": merch_lat,
            "merch_long": merch_long,
        });

        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("customers{}.csv", suffix)), customers).unwrap();
        fs::write(
            dir.join(format!("transactions{}.json", suffix)),
            serde_json::to_string(&transactions).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.join(format!("fraud{}.json", suffix)),
            serde_json::to_string(&serde_json::Value::Object(labels)).unwrap(),
        )
        .unwrap();
    }

    pub(crate) fn test_config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage = StorageConfig {
            root: root.join("storage"),
        };
        config.sources = SourceConfig {
            customers: root.join("sources/customers.csv"),
            transactions: root.join("sources/transactions.json"),
            fraud: root.join("sources/fraud.json"),
            default_version: "v1.0".to_string(),
        };
        config.models.random_forest.n_trees = 10;
        config
    }

    #[test]
    fn test_feature_set_is_derived_and_persisted() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&dir.path().join("sources"), "", 10, 12, 6);
        let lifecycle = DatasetLifecycle::from_config(&config);

        let features = lifecycle.feature_set("v1.0").unwrap();
        assert_eq!(features.train.len() + features.holdout.len(), 120);

        for kind in [ArtifactKind::MergedSet, ArtifactKind::Partition, ArtifactKind::FeatureSet] {
            assert!(lifecycle.store().exists(kind, "v1.0"), "{:?} missing", kind);
        }
        assert_eq!(lifecycle.materialized_versions().unwrap(), vec!["v1.0"]);
    }

    #[test]
    fn test_stored_feature_set_used_without_sources() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&dir.path().join("sources"), "", 10, 12, 6);
        let lifecycle = DatasetLifecycle::from_config(&config);
        let derived = lifecycle.feature_set("v1.0").unwrap();

        fs::remove_dir_all(dir.path().join("sources")).unwrap();
        let stored = lifecycle.feature_set("v1.0").unwrap();
        assert_eq!(stored, derived);
        assert_eq!(lifecycle.partition("v1.0").unwrap().holdout.len(), derived.holdout.len());
    }

    #[test]
    fn test_versioned_sources_and_missing_versions() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&dir.path().join("sources"), "_v2", 8, 10, 5);
        let lifecycle = DatasetLifecycle::from_config(&config);

        assert_eq!(lifecycle.feature_set("v2").unwrap().version, "v2");

        let err = lifecycle.feature_set("v9").unwrap_err();
        assert!(matches!(err, PipelineError::DatasetNotFound(v) if v == "v9"));
    }

    #[test]
    fn test_resolve_and_check_version() {
        let dir = TempDir::new().unwrap();
        let lifecycle = DatasetLifecycle::from_config(&test_config(dir.path()));

        assert_eq!(lifecycle.resolve_version(None), "v1.0");
        assert_eq!(lifecycle.resolve_version(Some(" ")), "v1.0");
        assert_eq!(lifecycle.resolve_version(Some("v1.1")), "v1.1");

        assert!(check_version("v1.1").is_ok());
        assert!(check_version("../v1").is_err());
        assert!(check_version("svm@v1").is_err());
    }
}
