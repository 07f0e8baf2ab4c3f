//! Dataset loaders

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{Level, event};

use crate::{
    domain::{constant::dataset as events, dataset::Dataset, error::CoordinatorError},
    port::dataset::DatasetLoader
};

/// Reads the initial dataset from disk and writes it to a working copy.
///
/// The working copy becomes the dataset's backing file, so the source file is
/// never modified by a run and `load` can be called again to reset.
#[derive(Debug, Clone)]
pub struct FileDatasetLoader {
    source:       PathBuf,
    working_copy: PathBuf
}

impl FileDatasetLoader {
    pub fn new(source: impl Into<PathBuf>, working_copy: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), working_copy: working_copy.into() }
    }
}

#[async_trait]
impl DatasetLoader for FileDatasetLoader {
    async fn load(&self) -> Result<Dataset, CoordinatorError> {
        let bytes = tokio::fs::read(&self.source).await.map_err(|e| {
            CoordinatorError::Dataset(format!("failed to read {}: {}", self.source.display(), e))
        })?;

        let content = String::from_utf8(bytes)
            .map_err(|_| CoordinatorError::Dataset(format!("{} is not valid UTF-8", self.source.display())))?;
        if content.trim().is_empty() {
            return Err(CoordinatorError::Dataset(format!("{} is empty", self.source.display())));
        }

        if let Some(parent) = self.working_copy.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CoordinatorError::FileSystem(format!("failed to create directory {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&self.working_copy, content.as_bytes()).await.map_err(|e| {
            CoordinatorError::FileSystem(format!("failed to write {}: {}", self.working_copy.display(), e))
        })?;
        event!(Level::DEBUG, event = events::WORKING_COPY_WRITTEN, path = %self.working_copy.display());

        let dataset = Dataset::new(content, self.working_copy.clone());
        let summary = dataset.summary();
        event!(
            Level::INFO,
            event = events::DATASET_LOADED,
            source = %self.source.display(),
            bytes = summary.bytes,
            lines = summary.lines
        );
        Ok(dataset)
    }
}

/// Serves a fixed dataset without touching the disk
#[derive(Debug, Clone)]
pub struct InMemoryDatasetLoader {
    dataset: Dataset
}

impl InMemoryDatasetLoader {
    pub fn new(content: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { dataset: Dataset::new(content.into(), path) }
    }
}

#[async_trait]
impl DatasetLoader for InMemoryDatasetLoader {
    async fn load(&self) -> Result<Dataset, CoordinatorError> {
        Ok(self.dataset.clone())
    }
}
