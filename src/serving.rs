//! Online serving pipeline: model selection, single-record prediction and history

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::features::{transform_single, FittedTransform};
use crate::metrics::{ClassificationMetrics, ServingStats};
use crate::models::{Classifier, ModelArtifact, ModelKind};
use crate::storage::ArtifactStore;
use crate::types::TransactionRequest;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::{Array1, ArrayView2, Axis};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Description of the selected model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    /// Name it was selected by
    pub name: String,
    pub kind: ModelKind,
    pub dataset_version: String,
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub holdout_metrics: ClassificationMetrics,
}

/// One remembered prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub input: TransactionRequest,
    pub fraud: bool,
}

struct ActiveModel {
    name: String,
    artifact: ModelArtifact,
}

/// Serving state machine. Without a selected model every prediction fails
/// with `NoModelSelected`.
pub struct ServingPipeline {
    store: ArtifactStore,
    active: Option<ActiveModel>,
    /// Canonical request JSON → latest decision, in first-seen order
    history: IndexMap<String, HistoryEntry>,
    stats: ServingStats,
}

impl ServingPipeline {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            active: None,
            history: IndexMap::new(),
            stats: ServingStats::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ArtifactStore::new(&config.storage.root))
    }

    pub fn is_ready(&self) -> bool {
        self.active.is_some()
    }

    /// Load and activate a model by `kind` or `kind@version`. On failure the
    /// previously selected model stays active.
    pub fn select_model(&mut self, name: &str) -> Result<ModelInfo> {
        let artifact = match ModelArtifact::load(&self.store, name) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(model = name, error = %e, "Model selection failed, keeping current model");
                return Err(e);
            }
        };

        self.active = Some(ActiveModel {
            name: name.to_string(),
            artifact,
        });

        let info = self.model_info().ok_or(PipelineError::NoModelSelected)?;
        info!(
            model = %info.name,
            kind = %info.kind,
            dataset_version = %info.dataset_version,
            "Model selected"
        );
        Ok(info)
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.active.as_ref().map(|active| ModelInfo {
            name: active.name.clone(),
            kind: active.artifact.kind,
            dataset_version: active.artifact.dataset_version.clone(),
            run_id: active.artifact.run_id,
            trained_at: active.artifact.trained_at,
            holdout_metrics: active.artifact.holdout_metrics,
        })
    }

    fn active(&self) -> Result<&ActiveModel> {
        self.active.as_ref().ok_or(PipelineError::NoModelSelected)
    }

    /// Feature transform the active model was trained with.
    pub fn fitted_transform(&self) -> Result<&FittedTransform> {
        Ok(&self.active()?.artifact.transform)
    }

    /// Score one transaction and remember the decision.
    pub fn predict(&mut self, request: &TransactionRequest) -> Result<bool> {
        let started = Instant::now();
        match self.score(request) {
            Ok((key, fraud)) => {
                self.history.insert(
                    key,
                    HistoryEntry {
                        input: request.clone(),
                        fraud,
                    },
                );
                self.stats.record_prediction(started.elapsed(), fraud);
                Ok(fraud)
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn score(&self, request: &TransactionRequest) -> Result<(String, bool)> {
        let active = self.active()?;
        let row = transform_single(&active.artifact.transform, request)?;
        let x = row.scaled.insert_axis(Axis(0));
        let decision = active.artifact.classifier.predict(x.view())?;
        let fraud = decision.get(0).copied() == Some(1);

        debug!(
            trans_num = request.trans_num.as_deref().unwrap_or("-"),
            fraud,
            raw = ?row.raw,
            "Transaction scored"
        );
        Ok((request.canonical_key()?, fraud))
    }

    /// Parse a JSON request (unknown fields rejected) and score it.
    pub fn predict_json(&mut self, payload: &str) -> Result<bool> {
        let request = TransactionRequest::from_json(payload).inspect_err(|_| self.stats.record_failure())?;
        self.predict(&request)
    }

    /// Raw model call on an already standardized feature matrix.
    pub fn predict_matrix(&self, x: ArrayView2<f64>) -> Result<Array1<u8>> {
        self.active()?.artifact.classifier.predict(x)
    }

    /// Remembered predictions in first-seen order.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.history.values().cloned().collect()
    }

    pub fn stats(&self) -> &ServingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelsConfig;
    use crate::features::tests::request;
    use crate::features::FeatureSet;
    use crate::partition::{sample, tests::synthetic_set, SplitStrategy};
    use crate::trainer::fit_and_score;
    use tempfile::TempDir;

    fn store_with_models(dir: &TempDir) -> ArtifactStore {
        let store = ArtifactStore::new(dir.path());
        let partition = sample(&synthetic_set(300, 20, 7), SplitStrategy::Group, 42, 0.2).unwrap();
        let features = FeatureSet::derive("v1.0", &partition).unwrap();

        let mut config = ModelsConfig::default();
        config.random_forest.n_trees = 5;
        for kind in [ModelKind::LogisticRegression, ModelKind::RandomForest] {
            fit_and_score(kind, &config, &features).unwrap().save(&store).unwrap();
        }
        store
    }

    #[test]
    fn test_predict_requires_a_model() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(ArtifactStore::new(dir.path()));

        let mut incomplete = request();
        incomplete.amt = None;
        // Model check comes before validation.
        assert!(matches!(pipeline.predict(&incomplete), Err(PipelineError::NoModelSelected)));
        assert!(pipeline.model_info().is_none());
        assert_eq!(pipeline.stats().failures(), 1);
    }

    #[test]
    fn test_failed_selection_keeps_current_model() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(store_with_models(&dir));

        pipeline.select_model("random_forest@v1.0").unwrap();
        let before = pipeline.model_info();

        let err = pipeline.select_model("ghost_model").unwrap_err();
        assert!(matches!(err, PipelineError::ModelNotFound(name) if name == "ghost_model"));
        assert_eq!(pipeline.model_info(), before);

        let mut unselected = ServingPipeline::new(ArtifactStore::new(dir.path()));
        assert!(unselected.select_model("ghost_model").is_err());
        assert!(!unselected.is_ready());
    }

    #[test]
    fn test_repeated_input_collapses_in_history() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(store_with_models(&dir));
        pipeline.select_model("logistic_regression").unwrap();

        let mut other = request();
        other.amt = Some(5000.0);

        let first = pipeline.predict(&request()).unwrap();
        pipeline.predict(&other).unwrap();
        let again = pipeline.predict(&request()).unwrap();

        assert_eq!(first, again);
        let history = pipeline.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].input, request());
        assert_eq!(history[1].input, other);
        assert_eq!(pipeline.stats().predictions(), 3);
    }

    #[test]
    fn test_validation_lists_missing_fields() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(store_with_models(&dir));
        pipeline.select_model("random_forest").unwrap();

        let mut incomplete = request();
        incomplete.merchant = None;
        incomplete.unix_time = None;

        match pipeline.predict(&incomplete) {
            Err(PipelineError::Validation(message)) => {
                assert!(message.contains("unix_time"));
                assert!(message.contains("merchant"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(pipeline.get_history().is_empty());
    }

    #[test]
    fn test_json_requests() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(store_with_models(&dir));
        pipeline.select_model("random_forest").unwrap();

        let payload = serde_json::to_string(&request()).unwrap();
        let decision = pipeline.predict_json(&payload).unwrap();

        let unknown = payload.replacen('{', "{\"is_vip\":true,", 1);
        assert!(matches!(pipeline.predict_json(&unknown), Err(PipelineError::Validation(_))));

        assert_eq!(pipeline.predict(&request()).unwrap(), decision);
        assert_eq!(pipeline.get_history().len(), 1);
    }

    #[test]
    fn test_predict_matrix_checks_width() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = ServingPipeline::new(store_with_models(&dir));
        assert!(matches!(
            pipeline.predict_matrix(ndarray::Array2::zeros((1, 9)).view()),
            Err(PipelineError::NoModelSelected)
        ));

        pipeline.select_model("logistic_regression").unwrap();
        assert_eq!(pipeline.predict_matrix(ndarray::Array2::zeros((3, 9)).view()).unwrap().len(), 3);
        assert!(pipeline.predict_matrix(ndarray::Array2::zeros((3, 4)).view()).is_err());
    }
}
