//! SecureBank fraud pipeline library
//!
//! Versioned ETL of raw transaction sources, leakage-free train/holdout
//! partitioning, feature derivation shared by batch and online paths,
//! classifier training, online scoring with history, and error-rate audits.

pub mod audit;
pub mod config;
pub mod error;
pub mod etl;
pub mod features;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod partition;
pub mod serving;
pub mod service;
pub mod storage;
pub mod trainer;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use lifecycle::DatasetLifecycle;
pub use models::{ClassifierModel, ModelArtifact, ModelKind};
pub use serving::ServingPipeline;
pub use service::{DatasetGenerator, FraudService, GenerateRequest};
pub use storage::ArtifactStore;
pub use trainer::{Trainer, TrainingReport};
pub use types::{MergedSet, TransactionRequest};
