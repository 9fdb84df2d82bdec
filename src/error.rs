//! Error taxonomy shared by every pipeline stage

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the fraud pipeline.
///
/// Every variant is terminal for the call that produced it. The front end maps
/// [`PipelineError::is_client_error`] to a 4xx/5xx style status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to parse source {}: {reason}", .path.display())]
    SourceFormat { path: PathBuf, reason: String },

    #[error("unparseable timestamp {value:?} for transaction {trans_num}")]
    DateParse { trans_num: String, value: String },

    #[error("missing required column(s): {}", .0.join(", "))]
    Schema(Vec<String>),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("unknown model kind {0:?}")]
    UnknownModelKind(String),

    #[error("dataset version {0:?} has not been materialized")]
    DatasetNotFound(String),

    #[error("model {0:?} not found")]
    ModelNotFound(String),

    #[error("no model selected")]
    NoModelSelected,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no dataset generator is attached to this service")]
    GeneratorUnavailable,

    #[error("artifact storage failure at {}: {reason}", .path.display())]
    Storage { path: PathBuf, reason: String },
}

impl PipelineError {
    /// Whether the failure was caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::UnknownModelKind(_)
                | PipelineError::DatasetNotFound(_)
                | PipelineError::ModelNotFound(_)
                | PipelineError::NoModelSelected
        )
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::SourceFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
