//! WorkflowManager Actor - owns the shared dataset between runs
//!
//! - Enforces a single workflow in flight
//! - Spawns each run as a task and folds its result back in via a message
//! - Serves status, dataset reset and dataset backup requests

use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    actor::{
        message::{WorkflowManagerMessage, WorkflowStatus},
        registry::RegistryHandle
    },
    domain::{
        constant::workflow_manager,
        dataset::{Dataset, DatasetSummary},
        error::CoordinatorError,
        report::WorkflowReport
    },
    port::{dataset::DatasetLoader, storage::ArtifactStore},
    workflow::Scheduler
};

/// Everything the manager needs at spawn time
pub struct WorkflowManagerArgs {
    pub registry:  RegistryHandle,
    pub scheduler: Scheduler,
    pub loader:    Arc<dyn DatasetLoader>,
    pub store:     Arc<dyn ArtifactStore>,
    /// Dataset loaded at startup
    pub dataset:   Dataset
}

pub struct WorkflowManagerState {
    registry:       RegistryHandle,
    scheduler:      Scheduler,
    loader:         Arc<dyn DatasetLoader>,
    store:          Arc<dyn ArtifactStore>,
    /// Current shared dataset; replaced only when a run finishes or on reset
    dataset:        Dataset,
    /// Run id of the workflow in flight
    running:        Option<String>,
    last_report:    Option<WorkflowReport>,
    completed_runs: u64,
    failed_runs:    u64
}

pub struct WorkflowManager;

#[async_trait::async_trait]
impl Actor for WorkflowManager {
    type Arguments = WorkflowManagerArgs;
    type Msg = WorkflowManagerMessage;
    type State = WorkflowManagerState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = workflow_manager::MANAGER_STARTED);

        Ok(WorkflowManagerState {
            registry:       args.registry,
            scheduler:      args.scheduler,
            loader:         args.loader,
            store:          args.store,
            dataset:        args.dataset,
            running:        None,
            last_report:    None,
            completed_runs: 0,
            failed_runs:    0
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkflowManagerMessage::StartWorkflow { reply } => {
                let result = self.handle_start(myself, state).await;
                Self::respond(reply, result);
            }
            WorkflowManagerMessage::WorkflowFinished { run_id, dataset, report } => {
                self.handle_finished(run_id, dataset, *report, state)
            }
            WorkflowManagerMessage::WorkflowAborted { run_id, error } => self.handle_aborted(run_id, error, state),
            WorkflowManagerMessage::GetStatus { reply } => {
                let status = WorkflowStatus {
                    running:        state.running.clone(),
                    last_report:    state.last_report.clone(),
                    dataset:        state.dataset.summary(),
                    completed_runs: state.completed_runs,
                    failed_runs:    state.failed_runs
                };
                Self::respond(reply, status);
            }
            WorkflowManagerMessage::ResetDataset { reply } => {
                let result = self.handle_reset(state).await;
                Self::respond(reply, result);
            }
            WorkflowManagerMessage::BackupDataset { reply } => {
                let result = state.store.backup(&state.dataset).await;
                if let Ok(path) = &result {
                    event!(Level::INFO, event = workflow_manager::DATASET_BACKED_UP, path = %path.display());
                }
                Self::respond(reply, result);
            }
        }
        Ok(())
    }
}

impl WorkflowManager {
    async fn handle_start(
        &self,
        myself: ActorRef<WorkflowManagerMessage>,
        state: &mut WorkflowManagerState
    ) -> Result<String, CoordinatorError> {
        event!(Level::DEBUG, event = workflow_manager::WORKFLOW_REQUESTED);

        if let Some(run_id) = &state.running {
            event!(Level::WARN, event = workflow_manager::WORKFLOW_REJECTED, running = %run_id);
            return Err(CoordinatorError::WorkflowBusy(run_id.clone()));
        }

        if state.registry.list().await?.is_empty() {
            event!(Level::WARN, event = workflow_manager::WORKFLOW_REJECTED, reason = "no workers");
            return Err(CoordinatorError::NoWorkers);
        }

        let run_id = Uuid::new_v4().to_string();
        state.running = Some(run_id.clone());

        let scheduler = state.scheduler.clone();
        let dataset = state.dataset.clone();
        let id = run_id.clone();
        let run = tokio::spawn(async move { scheduler.run(&id, dataset).await });

        let id = run_id.clone();
        tokio::spawn(async move {
            let message = match run.await {
                Ok((dataset, report)) => {
                    WorkflowManagerMessage::WorkflowFinished { run_id: id, dataset, report: Box::new(report) }
                }
                Err(e) => WorkflowManagerMessage::WorkflowAborted { run_id: id, error: e.to_string() }
            };
            if let Err(e) = myself.cast(message) {
                event!(Level::ERROR, event = workflow_manager::REPLY_FAILED, error = %e);
            }
        });

        event!(Level::INFO, event = workflow_manager::WORKFLOW_SPAWNED, run_id = %run_id);
        Ok(run_id)
    }

    fn handle_finished(&self, run_id: String, dataset: Dataset, report: WorkflowReport, state: &mut WorkflowManagerState) {
        if state.running.as_deref() != Some(run_id.as_str()) {
            event!(Level::WARN, event = workflow_manager::WORKFLOW_FAILED, run_id = %run_id, reason = "unknown run");
            return;
        }

        event!(
            Level::INFO,
            event = workflow_manager::WORKFLOW_COMPLETED,
            run_id = %run_id,
            workers = report.outcomes.len(),
            failed = report.failed_count(),
            last_updated_by = ?report.last_updated_by,
            final_path = ?report.final_path
        );

        state.running = None;
        state.dataset = dataset;
        state.last_report = Some(report);
        state.completed_runs += 1;
    }

    fn handle_aborted(&self, run_id: String, error: String, state: &mut WorkflowManagerState) {
        event!(Level::ERROR, event = workflow_manager::WORKFLOW_FAILED, run_id = %run_id, error = %error);
        if state.running.as_deref() == Some(run_id.as_str()) {
            state.running = None;
            state.failed_runs += 1;
        }
    }

    async fn handle_reset(&self, state: &mut WorkflowManagerState) -> Result<DatasetSummary, CoordinatorError> {
        if let Some(run_id) = &state.running {
            return Err(CoordinatorError::WorkflowBusy(run_id.clone()));
        }

        state.dataset = state.loader.load().await?;
        let summary = state.dataset.summary();
        event!(Level::INFO, event = workflow_manager::DATASET_RESET, bytes = summary.bytes, lines = summary.lines);
        Ok(summary)
    }

    fn respond<T>(reply: RpcReplyPort<T>, value: T) {
        if reply.send(value).is_err() {
            event!(Level::WARN, event = workflow_manager::REPLY_FAILED);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ractor::rpc::{CallResult, call};

    use super::*;
    use crate::{
        actor::registry::WorkerRegistry,
        adapter::{dataset::InMemoryDatasetLoader, notifier::NoopNotifier, storage::InMemoryArtifactStore},
        domain::worker::WorkerMode,
        protocol::{FrameLimits, Handshake, WorkerConnection, connection::tests::tcp_pair},
        workflow::SchedulerSettings
    };

    async fn spawn_manager(registry: RegistryHandle) -> ActorRef<WorkflowManagerMessage> {
        let loader = Arc::new(InMemoryDatasetLoader::new("text,label\nhello,1\n", "temp_processing.csv"));
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let settings = SchedulerSettings {
            final_tier_level:   8,
            work_timeout:       Duration::from_millis(600),
            settle_delay:       Duration::from_millis(5),
            owed_reply_wait:    Duration::from_millis(200),
            min_artifact_bytes: 101,
            limits:             FrameLimits::default()
        };
        let scheduler = Scheduler::new(registry.clone(), store.clone(), Arc::new(NoopNotifier), settings);
        let dataset = loader.load().await.unwrap();
        let args = WorkflowManagerArgs { registry, scheduler, loader, store, dataset };
        let (manager, _handle) = Actor::spawn(None, WorkflowManager, args).await.unwrap();
        manager
    }

    async fn start(manager: &ActorRef<WorkflowManagerMessage>) -> Result<String, CoordinatorError> {
        match call(manager, |reply| WorkflowManagerMessage::StartWorkflow { reply }, Some(Duration::from_secs(5)))
            .await
            .unwrap()
        {
            CallResult::Success(result) => result,
            _ => panic!("start call failed")
        }
    }

    async fn status(manager: &ActorRef<WorkflowManagerMessage>) -> WorkflowStatus {
        match call(manager, |reply| WorkflowManagerMessage::GetStatus { reply }, None).await.unwrap() {
            CallResult::Success(status) => status,
            _ => panic!("status call failed")
        }
    }

    #[tokio::test]
    async fn test_start_without_workers_is_rejected() {
        let registry = RegistryHandle::new(WorkerRegistry::spawn().await.unwrap());
        let manager = spawn_manager(registry).await;

        assert!(matches!(start(&manager).await, Err(CoordinatorError::NoWorkers)));
        assert!(status(&manager).await.running.is_none());
    }

    #[tokio::test]
    async fn test_second_start_while_running_is_busy() {
        let registry = RegistryHandle::new(WorkerRegistry::spawn().await.unwrap());
        // A worker that never answers keeps the first run busy until the work timeout
        let (server, _silent_client) = tcp_pair().await;
        let address = server.peer_addr().unwrap();
        registry
            .register(address, WorkerConnection::new(server), Handshake {
                name:  "Silent".to_string(),
                level: 1,
                mode:  WorkerMode::Sequential
            })
            .await
            .unwrap();
        let manager = spawn_manager(registry).await;

        let run_id = start(&manager).await.unwrap();
        match start(&manager).await {
            Err(CoordinatorError::WorkflowBusy(running)) => assert_eq!(running, run_id),
            other => panic!("expected busy, got {other:?}")
        }

        let reset = call(&manager, |reply| WorkflowManagerMessage::ResetDataset { reply }, None).await.unwrap();
        assert!(matches!(reset, CallResult::Success(Err(CoordinatorError::WorkflowBusy(_)))));

        // The run ends after the silent worker times out
        let mut finished = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let current = status(&manager).await;
            if current.running.is_none() {
                assert_eq!(current.completed_runs, 1);
                let report = current.last_report.unwrap();
                assert_eq!(report.run_id, run_id);
                assert_eq!(report.failed_count(), 1);
                finished = true;
                break;
            }
        }
        assert!(finished, "run did not finish");
    }
}
