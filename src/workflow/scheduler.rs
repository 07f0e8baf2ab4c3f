//! Multi-phase routing of the shared dataset through registered workers
//!
//! 1. Sequential workers outside the final tier, one at a time by level. Each
//!    real update replaces the dataset the next worker receives.
//! 2. Parallel workers, concurrently, all on the same snapshot. Their outputs
//!    are saved per worker and never merged back.
//! 3. Sequential workers at the final tier, against the dataset as it stood
//!    after phase 1.
//! 4. The final dataset is persisted and the results notifier is told.
//!
//! A worker that fails or times out only loses its own contribution.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{Level, event};

use crate::{
    actor::{message::RegisteredWorker, registry::RegistryHandle},
    domain::{
        constant::scheduler,
        dataset::Dataset,
        error::CoordinatorError,
        report::{OutcomeKind, Phase, WorkerOutcome, WorkflowReport}
    },
    port::{notifier::ResultsNotifier, storage::ArtifactStore},
    protocol::FrameLimits,
    workflow::{
        exchange::{ExchangeSettings, ReturnedArtifact, exchange},
        plan::PhasePlan
    }
};

const BUSY_REASON: &str = "still busy with a previous request";

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub final_tier_level:   u32,
    /// Bound on every read and write of one exchange
    pub work_timeout:       Duration,
    pub settle_delay:       Duration,
    /// Wait for a reply still owed from a timed-out exchange
    pub owed_reply_wait:    Duration,
    pub min_artifact_bytes: usize,
    pub limits:             FrameLimits
}

impl SchedulerSettings {
    fn exchange(&self) -> ExchangeSettings {
        ExchangeSettings {
            work_timeout:       self.work_timeout,
            settle_delay:       self.settle_delay,
            owed_reply_wait:    self.owed_reply_wait,
            min_artifact_bytes: self.min_artifact_bytes,
            limits:             self.limits
        }
    }
}

/// Sends the dataset to one worker and turns the answer into an outcome
#[derive(Clone)]
struct Dispatcher {
    registry: RegistryHandle,
    store:    Arc<dyn ArtifactStore>,
    settings: ExchangeSettings
}

impl Dispatcher {
    /// Returns the outcome plus the replacement dataset, if any
    async fn visit(&self, worker: &RegisteredWorker, phase: Phase, dataset: &Dataset) -> (WorkerOutcome, Option<Dataset>) {
        let info = &worker.info;
        let outcome = |status: Option<String>, kind: OutcomeKind| WorkerOutcome {
            worker: info.name.clone(),
            level: info.level,
            phase,
            status,
            kind
        };

        match self.registry.contains(info.address).await {
            Ok(true) => {}
            Ok(false) => {
                event!(Level::INFO, event = scheduler::WORKER_SKIPPED, worker = %info.name, phase = %phase);
                return (outcome(None, OutcomeKind::Skipped { reason: "no longer registered".to_string() }), None);
            }
            Err(e) => {
                event!(Level::WARN, event = scheduler::WORKER_SKIPPED, worker = %info.name, error = %e);
                return (outcome(None, OutcomeKind::Skipped { reason: e.to_string() }), None);
            }
        }

        event!(
            Level::INFO,
            event = scheduler::WORKER_DISPATCHED,
            worker = %info.name,
            level = info.level,
            phase = %phase,
            bytes = dataset.as_bytes().len()
        );

        let result = match exchange(&info.name, &worker.connection, dataset, &self.settings).await {
            Ok(result) => result,
            Err(CoordinatorError::WorkerBusy(_)) => {
                event!(Level::WARN, event = scheduler::WORKER_SKIPPED, worker = %info.name, reason = "busy");
                return (outcome(None, OutcomeKind::Skipped { reason: BUSY_REASON.to_string() }), None);
            }
            Err(e) => {
                self.handle_failure(worker, &e).await;
                return (outcome(None, OutcomeKind::Failed { error: e.to_string() }), None);
            }
        };

        event!(Level::INFO, event = scheduler::WORKER_RESULT, worker = %info.name, status = %result.status);
        let status = Some(result.status);

        match result.artifact {
            ReturnedArtifact::NoUpdate { reason } => {
                event!(Level::INFO, event = scheduler::DATASET_UNCHANGED, worker = %info.name, reason = %reason);
                (outcome(status, OutcomeKind::Unchanged { reason }), None)
            }
            ReturnedArtifact::Updated { content } if phase == Phase::Parallel => {
                match self.store.save_parallel_output(&info.name, &dataset.extension(), content.as_bytes()).await {
                    Ok(path) => {
                        event!(Level::INFO, event = scheduler::OUTPUT_SAVED, worker = %info.name, path = %path.display());
                        (outcome(status, OutcomeKind::Saved { path }), None)
                    }
                    Err(e) => {
                        event!(Level::ERROR, event = scheduler::WORKER_FAILED, worker = %info.name, error = %e);
                        (outcome(status, OutcomeKind::Failed { error: e.to_string() }), None)
                    }
                }
            }
            ReturnedArtifact::Updated { content } => {
                let updated = dataset.with_content(content);
                // The backing file and the in-memory copy change together or not at all
                if let Err(e) = self.store.write_backing(&updated).await {
                    event!(Level::ERROR, event = scheduler::WORKER_FAILED, worker = %info.name, error = %e);
                    return (outcome(status, OutcomeKind::Failed { error: e.to_string() }), None);
                }
                let bytes = updated.as_bytes().len();
                event!(Level::INFO, event = scheduler::DATASET_UPDATED, worker = %info.name, bytes = bytes);
                (outcome(status, OutcomeKind::Updated { bytes }), Some(updated))
            }
        }
    }

    async fn handle_failure(&self, worker: &RegisteredWorker, error: &CoordinatorError) {
        let info = &worker.info;
        if error.is_hard_close() {
            event!(Level::WARN, event = scheduler::WORKER_DROPPED, worker = %info.name, error = %error);
            if let Err(e) = self.registry.unregister(info.address).await {
                event!(Level::ERROR, event = scheduler::WORKER_FAILED, worker = %info.name, error = %e);
            }
        } else {
            event!(Level::WARN, event = scheduler::WORKER_FAILED, worker = %info.name, error = %error);
        }
    }
}

/// Runs workflows against the current registry
#[derive(Clone)]
pub struct Scheduler {
    dispatcher:       Dispatcher,
    notifier:         Arc<dyn ResultsNotifier>,
    final_tier_level: u32
}

impl Scheduler {
    pub fn new(
        registry: RegistryHandle,
        store: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn ResultsNotifier>,
        settings: SchedulerSettings
    ) -> Self {
        Self {
            dispatcher: Dispatcher { registry, store, settings: settings.exchange() },
            notifier,
            final_tier_level: settings.final_tier_level
        }
    }

    /// Run every phase and return the dataset as it stands afterwards
    pub async fn run(&self, run_id: &str, dataset: Dataset) -> (Dataset, WorkflowReport) {
        let mut report = WorkflowReport::new(run_id);

        let workers = match self.dispatcher.registry.sorted_by_level().await {
            Ok(workers) => workers,
            Err(e) => {
                event!(Level::ERROR, event = scheduler::REGISTRY_UNAVAILABLE, run_id = %run_id, error = %e);
                report.finished_at = Some(Utc::now());
                return (dataset, report);
            }
        };
        let plan = PhasePlan::from_workers(workers, self.final_tier_level);

        let dataset = self.run_sequential(Phase::Sequential, &plan.sequential, dataset, &mut report).await;
        self.run_parallel(&plan.parallel, &dataset, &mut report).await;
        let dataset = self.run_sequential(Phase::FinalTier, &plan.final_tier, dataset, &mut report).await;

        match self.dispatcher.store.persist_final(&dataset).await {
            Ok(path) => {
                event!(Level::INFO, event = scheduler::FINAL_PERSISTED, run_id = %run_id, path = %path.display());
                report.final_path = Some(path);
                self.notifier.results_ready();
            }
            Err(e) => {
                event!(Level::ERROR, event = scheduler::FINAL_PERSIST_FAILED, run_id = %run_id, error = %e);
            }
        }

        report.finished_at = Some(Utc::now());
        (dataset, report)
    }

    async fn run_sequential(
        &self,
        phase: Phase,
        workers: &[RegisteredWorker],
        mut dataset: Dataset,
        report: &mut WorkflowReport
    ) -> Dataset {
        if workers.is_empty() {
            return dataset;
        }
        event!(Level::INFO, event = scheduler::PHASE_STARTED, phase = %phase, workers = workers.len());

        for worker in workers {
            let (outcome, updated) = self.dispatcher.visit(worker, phase, &dataset).await;
            report.record(outcome);
            if let Some(updated) = updated {
                dataset = updated;
            }
        }

        event!(Level::INFO, event = scheduler::PHASE_COMPLETED, phase = %phase);
        dataset
    }

    async fn run_parallel(&self, workers: &[RegisteredWorker], snapshot: &Dataset, report: &mut WorkflowReport) {
        if workers.is_empty() {
            return;
        }
        event!(Level::INFO, event = scheduler::PHASE_STARTED, phase = %Phase::Parallel, workers = workers.len());

        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();
        for worker in workers {
            let dispatcher = self.dispatcher.clone();
            let worker = worker.clone();
            let snapshot = snapshot.clone();
            let identity = (worker.info.name.clone(), worker.info.level);
            let handle = tasks.spawn(async move { dispatcher.visit(&worker, Phase::Parallel, &snapshot).await.0 });
            spawned.insert(handle.id(), identity);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    let (worker, level) = spawned.remove(&e.id()).unwrap_or_else(|| ("unknown".to_string(), 0));
                    event!(Level::ERROR, event = scheduler::WORKER_FAILED, worker = %worker, error = %e);
                    report.record(WorkerOutcome {
                        worker,
                        level,
                        phase: Phase::Parallel,
                        status: None,
                        kind: OutcomeKind::Failed { error: e.to_string() }
                    });
                }
            }
        }

        event!(Level::INFO, event = scheduler::PHASE_COMPLETED, phase = %Phase::Parallel);
    }
}
