//! Versioned artifact store
//!
//! Every stage output (merged set, partition, feature set, model) is stored as a
//! bincode file under `root/<kind>/<name>.bin`. Writes land in a temporary file
//! that is renamed into place, so a failed stage never leaves a partial artifact.

use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSION: &str = "bin";

/// Kinds of persisted artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    MergedSet,
    Partition,
    FeatureSet,
    Model,
}

impl ArtifactKind {
    fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::MergedSet => "raw_data",
            ArtifactKind::Partition => "partitioned_data",
            ArtifactKind::FeatureSet => "features",
            ArtifactKind::Model => "models",
        }
    }

    fn not_found(self, name: &str) -> PipelineError {
        match self {
            ArtifactKind::Model => PipelineError::ModelNotFound(name.to_string()),
            _ => PipelineError::DatasetNotFound(name.to_string()),
        }
    }
}

/// Filesystem-backed store keyed by `(kind, name)`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. Directories are created lazily on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of an artifact; rejects names that would escape the store.
    pub fn path_for(&self, kind: ArtifactKind, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(PipelineError::Validation(format!(
                "invalid artifact name {:?}",
                name
            )));
        }
        Ok(self
            .root
            .join(kind.dir_name())
            .join(format!("{}.{}", name, EXTENSION)))
    }

    pub fn exists(&self, kind: ArtifactKind, name: &str) -> bool {
        self.path_for(kind, name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Write an artifact, replacing any previous one with the same key.
    pub fn save<T: Serialize>(&self, kind: ArtifactKind, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path_for(kind, name)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| PipelineError::storage(dir, e))?;

        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        let written = write_encoded(&tmp, value);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            PipelineError::storage(&path, e)
        })?;

        debug!(kind = ?kind, name, path = %path.display(), "Artifact written");
        Ok(path)
    }

    /// Read an artifact. A missing key maps to `ModelNotFound` for models and
    /// `DatasetNotFound` for every dataset stage.
    pub fn load<T: DeserializeOwned>(&self, kind: ArtifactKind, name: &str) -> Result<T> {
        let path = self.path_for(kind, name)?;
        if !path.is_file() {
            return Err(kind.not_found(name));
        }

        let file = fs::File::open(&path).map_err(|e| PipelineError::storage(&path, e))?;
        let value = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| PipelineError::storage(&path, e))?;

        debug!(kind = ?kind, name, path = %path.display(), "Artifact read");
        Ok(value)
    }

    /// Names stored for a kind, sorted.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<String>> {
        let dir = self.root.join(kind.dir_name());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PipelineError::storage(&dir, e))? {
            let path = entry.map_err(|e| PipelineError::storage(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();

        info!(kind = ?kind, count = names.len(), "Listed artifacts");
        Ok(names)
    }
}

fn write_encoded<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| PipelineError::storage(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, value).map_err(|e| PipelineError::storage(path, e))?;
    writer.flush().map_err(|e| PipelineError::storage(path, e))?;
    Ok(())
}
