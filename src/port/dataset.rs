use async_trait::async_trait;

use crate::domain::{dataset::Dataset, error::CoordinatorError};

/// Supplies the initial dataset and its backing file
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self) -> Result<Dataset, CoordinatorError>;
}
