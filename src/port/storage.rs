use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{dataset::Dataset, error::CoordinatorError};

/// Durable locations for the shared dataset and everything derived from it
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Overwrite the dataset's backing file with its current content
    async fn write_backing(&self, dataset: &Dataset) -> Result<(), CoordinatorError>;

    /// Keep one parallel worker's returned artifact under a worker-named, timestamped path
    async fn save_parallel_output(
        &self,
        worker: &str,
        extension: &str,
        payload: &[u8]
    ) -> Result<PathBuf, CoordinatorError>;

    /// Persist the dataset as the final result of a run
    async fn persist_final(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError>;

    /// Copy the dataset to a timestamped backup
    async fn backup(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError>;
}
