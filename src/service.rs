//! Transport-independent front end over the pipeline stages
//!
//! Every operation returns a serializable response so a thin HTTP or CLI layer
//! can hand it straight to `serde_json`.

use crate::audit::{self, AuditReport};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::etl::SourcePaths;
use crate::lifecycle::{check_version, DatasetLifecycle};
use crate::serving::{HistoryEntry, ModelInfo, ServingPipeline};
use crate::storage::ArtifactKind;
use crate::trainer::{Trainer, TrainingReport};
use crate::types::TransactionRequest;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters of a synthetic dataset version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub version: String,
    pub num_customers: usize,
    pub num_transactions: usize,
    pub fraud_ratio: f64,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            version: String::new(),
            num_customers: 1000,
            num_transactions: 10000,
            fraud_ratio: 0.01,
        }
    }
}

impl GenerateRequest {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        check_version(&self.version)?;
        if self.num_customers == 0 || self.num_transactions == 0 {
            return Err(PipelineError::Validation(
                "num_customers and num_transactions must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fraud_ratio) {
            return Err(PipelineError::Validation(format!(
                "fraud_ratio must be in [0, 1], got {}",
                self.fraud_ratio
            )));
        }
        Ok(())
    }
}

/// Writes the raw source files of a new dataset version.
pub trait DatasetGenerator: Send {
    fn generate(&self, request: &GenerateRequest, target: &SourcePaths) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictResponse {
    pub fraud: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    fn new(message: String) -> Self {
        Self { message }
    }
}

/// Front end holding one serving pipeline and the training/audit stages
pub struct FraudService {
    lifecycle: DatasetLifecycle,
    trainer: Trainer,
    pipeline: ServingPipeline,
    generator: Option<Box<dyn DatasetGenerator>>,
}

impl FraudService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            lifecycle: DatasetLifecycle::from_config(config),
            trainer: Trainer::from_config(config),
            pipeline: ServingPipeline::from_config(config),
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn DatasetGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn predict(&mut self, request: &TransactionRequest) -> Result<PredictResponse> {
        let fraud = self.pipeline.predict(request)?;
        Ok(PredictResponse { fraud })
    }

    /// Same as [`FraudService::predict`] for a raw JSON body.
    pub fn predict_json(&mut self, payload: &str) -> Result<PredictResponse> {
        let fraud = self.pipeline.predict_json(payload)?;
        Ok(PredictResponse { fraud })
    }

    pub fn generate_dataset(&self, request: &GenerateRequest) -> Result<StatusResponse> {
        let generator = self.generator.as_ref().ok_or(PipelineError::GeneratorUnavailable)?;
        request.validate()?;

        let target = self.lifecycle.source_paths(&request.version);
        generator.generate(request, &target)?;

        info!(
            version = %request.version,
            customers = request.num_customers,
            transactions = request.num_transactions,
            fraud_ratio = request.fraud_ratio,
            "Dataset generated"
        );
        Ok(StatusResponse::new(format!(
            "Dataset version {} generated successfully",
            request.version
        )))
    }

    pub fn train_model(&self, model_name: &str, dataset_version: Option<&str>) -> Result<TrainingReport> {
        self.trainer.train(model_name, dataset_version)
    }

    pub fn select_model(&mut self, model_name: &str) -> Result<StatusResponse> {
        let info = self.pipeline.select_model(model_name)?;
        Ok(StatusResponse::new(format!(
            "Model {} selected successfully (trained on {})",
            info.name, info.dataset_version
        )))
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.pipeline.model_info()
    }

    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.pipeline.get_history()
    }

    pub fn audit_performance(&self, dataset_version: &str) -> Result<AuditReport> {
        audit::audit(&self.pipeline, &self.lifecycle, dataset_version)
    }

    /// Versions that already have a stored feature set.
    pub fn datasets(&self) -> Result<Vec<String>> {
        self.lifecycle.materialized_versions()
    }

    /// Stored model names, both `kind` and `kind@version`.
    pub fn models(&self) -> Result<Vec<String>> {
        self.lifecycle.store().list(ArtifactKind::Model)
    }

    pub fn pipeline(&self) -> &ServingPipeline {
        &self.pipeline
    }
}
