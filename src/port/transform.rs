use async_trait::async_trait;

/// What a worker's stage produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Free-form status reported back to the coordinator
    pub status:  String,
    /// Replacement dataset; `None` keeps the coordinator's copy
    pub updated: Option<String>
}

impl TransformOutcome {
    pub fn unchanged(status: impl Into<String>) -> Self {
        Self { status: status.into(), updated: None }
    }

    pub fn updated(status: impl Into<String>, content: impl Into<String>) -> Self {
        Self { status: status.into(), updated: Some(content.into()) }
    }
}

/// Worker-side business logic for one pipeline stage
#[async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, dataset: &str) -> TransformOutcome;
}
