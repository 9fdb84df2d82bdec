//! Model training on a versioned feature set

use crate::config::{AppConfig, ModelsConfig};
use crate::error::Result;
use crate::features::FeatureSet;
use crate::lifecycle::{check_version, DatasetLifecycle};
use crate::metrics::ClassificationMetrics;
use crate::models::{Classifier, ClassifierModel, ModelArtifact, ModelKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span};
use uuid::Uuid;

/// Outcome of one training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    /// Store key of the artifact (`kind@version`)
    pub model: String,
    pub kind: ModelKind,
    pub dataset_version: String,
    pub trained_at: DateTime<Utc>,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub metrics: ClassificationMetrics,
}

impl TrainingReport {
    fn new(artifact: &ModelArtifact, features: &FeatureSet) -> Self {
        Self {
            run_id: artifact.run_id,
            model: artifact.name(),
            kind: artifact.kind,
            dataset_version: artifact.dataset_version.clone(),
            trained_at: artifact.trained_at,
            train_rows: features.train.len(),
            holdout_rows: features.holdout.len(),
            metrics: artifact.holdout_metrics,
        }
    }
}

pub struct Trainer {
    lifecycle: DatasetLifecycle,
    models: ModelsConfig,
}

impl Trainer {
    pub fn new(lifecycle: DatasetLifecycle, models: ModelsConfig) -> Self {
        Self { lifecycle, models }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(DatasetLifecycle::from_config(config), config.models.clone())
    }

    /// Train a model kind on a dataset version (default version when `None`),
    /// score it on the holdout and persist it.
    pub fn train(&self, kind: &str, dataset_version: Option<&str>) -> Result<TrainingReport> {
        let kind: ModelKind = kind.parse()?;
        let version = self.lifecycle.resolve_version(dataset_version);
        check_version(&version)?;

        let span = info_span!("train", kind = %kind, version = %version);
        let _guard = span.enter();

        let features = self.lifecycle.feature_set(&version)?;
        let artifact = fit_and_score(kind, &self.models, &features)?;
        artifact.save(self.lifecycle.store())?;

        let report = TrainingReport::new(&artifact, &features);
        info!(
            run_id = %report.run_id,
            precision = report.metrics.precision,
            recall = report.metrics.recall,
            f1 = report.metrics.f1,
            "Training run finished"
        );
        Ok(report)
    }
}

/// Fit a fresh classifier on the train side and evaluate it on the holdout.
pub fn fit_and_score(kind: ModelKind, config: &ModelsConfig, features: &FeatureSet) -> Result<ModelArtifact> {
    let started = Instant::now();
    let mut classifier = ClassifierModel::new(kind, config);
    classifier.fit(features.train.x.view(), features.train.y.view())?;

    let predicted = classifier.predict(features.holdout.x.view())?;
    let holdout_metrics = ClassificationMetrics::evaluate(features.holdout.y.view(), predicted.view())?;

    info!(
        kind = %kind,
        train_rows = features.train.len(),
        holdout_rows = features.holdout.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Classifier fitted"
    );

    Ok(ModelArtifact {
        kind,
        dataset_version: features.version.clone(),
        run_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        transform: features.transform.clone(),
        classifier,
        holdout_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::lifecycle::tests::{test_config, write_sources};
    use crate::storage::ArtifactKind;
    use tempfile::TempDir;

    #[test]
    fn test_train_persists_both_names() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_sources(&dir.path().join("sources"), "", 10, 15, 7);
        let trainer = Trainer::from_config(&config);

        let report = trainer.train("random_forest", None).unwrap();
        assert_eq!(report.model, "random_forest@v1.0");
        assert_eq!(report.dataset_version, "v1.0");
        assert_eq!(report.train_rows + report.holdout_rows, 150);
        assert!((0.0..=1.0).contains(&report.metrics.f1));

        let store = trainer.lifecycle.store();
        assert!(store.exists(ArtifactKind::Model, "random_forest@v1.0"));
        assert!(store.exists(ArtifactKind::Model, "random_forest"));

        let stored = ModelArtifact::load(store, "random_forest").unwrap();
        assert_eq!(stored.run_id, report.run_id);
    }

    #[test]
    fn test_unknown_kind_fails_before_touching_data() {
        let dir = TempDir::new().unwrap();
        let trainer = Trainer::from_config(&test_config(dir.path()));

        let err = trainer.train("xgboost", Some("v1.0")).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownModelKind(kind) if kind == "xgboost"));
    }

    #[test]
    fn test_unmaterialized_version() {
        let dir = TempDir::new().unwrap();
        let trainer = Trainer::from_config(&test_config(dir.path()));

        let err = trainer.train("svm", Some("v7")).unwrap_err();
        assert!(matches!(err, PipelineError::DatasetNotFound(v) if v == "v7"));
    }
}
