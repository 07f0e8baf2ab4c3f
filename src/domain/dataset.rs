//! The shared dataset threaded through the pipeline

use std::{
    path::{Path, PathBuf},
    sync::Arc
};

use serde::{Deserialize, Serialize};

/// Filename carried by a returned frame that means "keep the prior dataset".
pub const NO_UPDATE_FILENAME: &str = "no_update.txt";
/// Payload carried alongside [`NO_UPDATE_FILENAME`].
pub const NO_UPDATE_MARKER: &[u8] = b"NO_UPDATE";

/// In-memory dataset content plus its durable backing file.
///
/// Cloning is cheap and every clone shares the same bytes, so all workers of a
/// parallel phase observe one identical snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    content: Arc<str>,
    path:    PathBuf
}

impl Dataset {
    pub fn new(content: impl Into<Arc<str>>, path: impl Into<PathBuf>) -> Self {
        Self { content: content.into(), path: path.into() }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name sent in the `send_file` header
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "dataset".to_string())
    }

    /// Extension used for derived outputs; datasets are CSV unless the backing file says otherwise
    pub fn extension(&self) -> String {
        self.path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_else(|| "csv".to_string())
    }

    /// Same backing file, new content
    pub fn with_content(&self, content: impl Into<Arc<str>>) -> Self {
        Self { content: content.into(), path: self.path.clone() }
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            path:  self.path.clone(),
            bytes: self.content.len(),
            lines: self.content.lines().filter(|l| !l.trim().is_empty()).count()
        }
    }
}

/// Size information shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path:  PathBuf,
    pub bytes: usize,
    pub lines: usize
}
