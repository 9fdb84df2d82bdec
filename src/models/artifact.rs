//! Persisted model: classifier state plus the feature transform it was trained with

use super::{ClassifierModel, ModelKind};
use crate::error::Result;
use crate::features::FittedTransform;
use crate::metrics::ClassificationMetrics;
use crate::storage::{ArtifactKind, ArtifactStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: ModelKind,
    pub dataset_version: String,
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub transform: FittedTransform,
    pub classifier: ClassifierModel,
    /// Scores on the holdout partition at training time
    pub holdout_metrics: ClassificationMetrics,
}

impl ModelArtifact {
    /// Store key of a model trained on a dataset version: `kind@version`.
    pub fn versioned_name(kind: ModelKind, dataset_version: &str) -> String {
        format!("{}@{}", kind, dataset_version)
    }

    pub fn name(&self) -> String {
        Self::versioned_name(self.kind, &self.dataset_version)
    }

    /// Store under `kind@version` and under the bare `kind` alias (latest trained).
    pub fn save(&self, store: &ArtifactStore) -> Result<()> {
        let name = self.name();
        store.save(ArtifactKind::Model, &name, self)?;
        let path = store.save(ArtifactKind::Model, self.kind.as_str(), self)?;

        info!(model = %name, alias = %self.kind, path = %path.display(), "Model artifact stored");
        Ok(())
    }

    /// Load by `kind` or `kind@version`. Unknown names are `ModelNotFound`.
    pub fn load(store: &ArtifactStore, name: &str) -> Result<Self> {
        store.load(ArtifactKind::Model, name)
    }
}
