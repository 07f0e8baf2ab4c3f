//! Artifact storage implementations
//!
//! This module provides both in-memory and file-system implementations of the
//! ArtifactStore trait.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc
};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::RwLock;

use crate::{
    domain::{dataset::Dataset, error::CoordinatorError},
    port::storage::ArtifactStore
};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Keep only characters that are safe in a file name
fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

/// In-memory artifact store
///
/// Paths are virtual keys. Suitable for tests; nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactStore {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().await.get(path).cloned()
    }

    /// All stored paths starting with `prefix`, sorted
    pub async fn paths_with_prefix(&self, prefix: &str) -> Vec<PathBuf> {
        let files = self.files.read().await;
        let mut paths: Vec<PathBuf> =
            files.keys().filter(|p| p.to_string_lossy().starts_with(prefix)).cloned().collect();
        paths.sort();
        paths
    }

    async fn put_unique(&self, base: String, extension: &str, content: Vec<u8>) -> PathBuf {
        let mut files = self.files.write().await;
        let mut path = PathBuf::from(format!("{}.{}", base, extension));
        let mut n = 1;
        while files.contains_key(&path) {
            path = PathBuf::from(format!("{}_{}.{}", base, n, extension));
            n += 1;
        }
        files.insert(path.clone(), content);
        path
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write_backing(&self, dataset: &Dataset) -> Result<(), CoordinatorError> {
        self.files.write().await.insert(dataset.path().to_path_buf(), dataset.as_bytes().to_vec());
        Ok(())
    }

    async fn save_parallel_output(
        &self,
        worker: &str,
        extension: &str,
        payload: &[u8]
    ) -> Result<PathBuf, CoordinatorError> {
        let base = format!("parallel_{}_{}", sanitize(worker), timestamp());
        Ok(self.put_unique(base, extension, payload.to_vec()).await)
    }

    async fn persist_final(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError> {
        let base = format!("final_processed_data_{}", timestamp());
        Ok(self.put_unique(base, &dataset.extension(), dataset.as_bytes().to_vec()).await)
    }

    async fn backup(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError> {
        let base = format!("backup_{}", timestamp());
        Ok(self.put_unique(base, &dataset.extension(), dataset.as_bytes().to_vec()).await)
    }
}

/// File-system artifact store
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    /// Parallel worker outputs
    received_dir: PathBuf,
    /// Final results
    output_dir:   PathBuf,
    backup_dir:   PathBuf
}

impl FileArtifactStore {
    pub fn new(received_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self { received_dir: received_dir.into(), output_dir: output_dir.into(), backup_dir: backup_dir.into() }
    }

    pub fn received_dir(&self) -> &Path {
        &self.received_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `content` to `<dir>/<base>.<ext>`, adding a counter when that name is taken
    async fn write_unique(
        &self,
        dir: &Path,
        base: &str,
        extension: &str,
        content: &[u8]
    ) -> Result<PathBuf, CoordinatorError> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            CoordinatorError::FileSystem(format!("failed to create directory {}: {}", dir.display(), e))
        })?;

        let mut path = dir.join(format!("{}.{}", base, extension));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = dir.join(format!("{}_{}.{}", base, n, extension));
            n += 1;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| CoordinatorError::FileSystem(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn write_backing(&self, dataset: &Dataset) -> Result<(), CoordinatorError> {
        let path = dataset.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CoordinatorError::FileSystem(format!("failed to create directory {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(path, dataset.as_bytes())
            .await
            .map_err(|e| CoordinatorError::FileSystem(format!("failed to write {}: {}", path.display(), e)))
    }

    async fn save_parallel_output(
        &self,
        worker: &str,
        extension: &str,
        payload: &[u8]
    ) -> Result<PathBuf, CoordinatorError> {
        let base = format!("parallel_{}_{}", sanitize(worker), timestamp());
        self.write_unique(&self.received_dir, &base, extension, payload).await
    }

    async fn persist_final(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError> {
        let base = format!("final_processed_data_{}", timestamp());
        self.write_unique(&self.output_dir, &base, &dataset.extension(), dataset.as_bytes()).await
    }

    async fn backup(&self, dataset: &Dataset) -> Result<PathBuf, CoordinatorError> {
        let base = format!("backup_{}", timestamp());
        self.write_unique(&self.backup_dir, &base, &dataset.extension(), dataset.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_keeps_parallel_outputs_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path().join("received"), dir.path().join("out"), dir.path().join("bak"));

        let first = store.save_parallel_output("Model1", "csv", b"first").await.unwrap();
        let second = store.save_parallel_output("Model1", "csv", b"second").await.unwrap();
        let other = store.save_parallel_output("Model 2/x", "csv", b"other").await.unwrap();

        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("parallel_Model1_"));
        assert!(other.file_name().unwrap().to_string_lossy().starts_with("parallel_Model_2_x_"));
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&second).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_file_store_final_and_backing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path().join("received"), dir.path().join("out"), dir.path().join("bak"));
        let dataset = Dataset::new("a,b\n1,2\n", dir.path().join("work").join("temp_processing.csv"));

        store.write_backing(&dataset).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(dataset.path()).await.unwrap(), "a,b\n1,2\n");

        let final_path = store.persist_final(&dataset).await.unwrap();
        assert!(final_path.starts_with(dir.path().join("out")));
        assert_eq!(final_path.extension().unwrap(), "csv");

        let backup = store.backup(&dataset).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(backup).await.unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_inmemory_store() {
        let store = InMemoryArtifactStore::new();
        let dataset = Dataset::new("x\n", "temp_processing.csv");

        store.write_backing(&dataset).await.unwrap();
        assert_eq!(store.get(Path::new("temp_processing.csv")).await.unwrap(), b"x\n");

        store.save_parallel_output("Model1", "csv", b"m1").await.unwrap();
        store.save_parallel_output("Model1", "csv", b"m1 again").await.unwrap();
        assert_eq!(store.paths_with_prefix("parallel_Model1_").await.len(), 2);
    }
}
