//! What happened during one workflow run

use std::{fmt::Display, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduling phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Sequential workers below or above the final tier
    Sequential,
    Parallel,
    /// Sequential workers at the final tier, run after the parallel phase
    FinalTier
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Sequential => write!(f, "sequential"),
            Phase::Parallel => write!(f, "parallel"),
            Phase::FinalTier => write!(f, "final-tier")
        }
    }
}

/// Result of one worker's turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// The shared dataset was replaced
    Updated { bytes: usize },
    /// The worker answered but the dataset was kept
    Unchanged { reason: String },
    /// A parallel worker's output was written to its own file
    Saved { path: PathBuf },
    /// Timeout or transport error; the contribution was dropped
    Failed { error: String },
    /// Not attempted
    Skipped { reason: String }
}

impl Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Updated { bytes } => write!(f, "updated ({} bytes)", bytes),
            OutcomeKind::Unchanged { reason } => write!(f, "unchanged: {}", reason),
            OutcomeKind::Saved { path } => write!(f, "saved to {}", path.display()),
            OutcomeKind::Failed { error } => write!(f, "failed: {}", error),
            OutcomeKind::Skipped { reason } => write!(f, "skipped: {}", reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker: String,
    pub level:  u32,
    pub phase:  Phase,
    /// Status text reported by the worker, if it got that far
    pub status: Option<String>,
    pub kind:   OutcomeKind
}

/// Summary of a finished workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub run_id:          String,
    pub started_at:      DateTime<Utc>,
    pub finished_at:     Option<DateTime<Utc>>,
    pub outcomes:        Vec<WorkerOutcome>,
    /// Last worker whose output replaced the shared dataset
    pub last_updated_by: Option<String>,
    pub final_path:      Option<PathBuf>
}

impl WorkflowReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id:          run_id.into(),
            started_at:      Utc::now(),
            finished_at:     None,
            outcomes:        Vec::new(),
            last_updated_by: None,
            final_path:      None
        }
    }

    pub fn record(&mut self, outcome: WorkerOutcome) {
        if matches!(outcome.kind, OutcomeKind::Updated { .. }) {
            self.last_updated_by = Some(outcome.worker.clone());
        }
        self.outcomes.push(outcome);
    }

    pub fn outcomes_in(&self, phase: Phase) -> impl Iterator<Item = &WorkerOutcome> {
        self.outcomes.iter().filter(move |o| o.phase == phase)
    }

    pub fn outcome_for(&self, worker: &str) -> Option<&WorkerOutcome> {
        self.outcomes.iter().find(|o| o.worker == worker)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o.kind, OutcomeKind::Failed { .. })).count()
    }
}
